use anyhow::Result;
use tracing::info;

use crate::plan::MissionPlan;

/// Largest sensible spread between mission points, km.
const MAX_FIELD_KM: f64 = 2.0;

pub fn check_mission(plan: &MissionPlan) -> Result<()> {
    for (name, p) in [("pylon1", plan.pylon1), ("pylon2", plan.pylon2), ("mast", plan.mast)] {
        anyhow::ensure!(p.is_valid(), "mission.{} coordinates invalid", name);
    }
    anyhow::ensure!(plan.pylon1 != plan.pylon2, "mission pylons coincide");
    anyhow::ensure!(plan.pylon1.distance(&plan.pylon2) <= MAX_FIELD_KM, "mission pylons too far apart");
    anyhow::ensure!(plan.pylon1.distance(&plan.mast) <= MAX_FIELD_KM, "mission.mast too far from pylon1");
    check_envelope(plan)?;
    info!("doctor: mission geometry OK");
    Ok(())
}

pub fn check_envelope(plan: &MissionPlan) -> Result<()> {
    anyhow::ensure!(plan.takeoff_alt_m > 0.0, "mission.takeoff_alt_m must be positive");
    anyhow::ensure!(plan.alt_range_max() <= plan.max_alt_m, "takeoff altitude band exceeds mission.max_alt_m");
    anyhow::ensure!(plan.mast_alt_m > 0.0 && plan.mast_alt_m <= plan.max_alt_m, "mission.mast_alt_m out of range");
    anyhow::ensure!(plan.max_speed_mps > 0.0 && plan.max_speed_mps < 20.0, "mission.max_speed_mps out of range");
    anyhow::ensure!(
        plan.point_percent_accuracy > 0.0 && plan.point_percent_accuracy < 1.0,
        "mission.point_percent_accuracy should be in (0, 1)"
    );
    anyhow::ensure!(
        plan.alt_percent_accuracy > 0.0 && plan.alt_percent_accuracy < 1.0,
        "mission.alt_percent_accuracy should be in (0, 1)"
    );
    anyhow::ensure!(plan.offset.dist_km >= 0.0 && plan.offset.dist_km < 0.1, "mission.offset.dist_km out of range");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_plan_passes() {
        check_mission(&MissionPlan::default()).unwrap();
    }

    #[test]
    fn rejects_band_above_ceiling() {
        let plan = MissionPlan { takeoff_alt_m: 8.5, ..MissionPlan::default() };
        assert!(check_mission(&plan).is_err());
    }

    #[test]
    fn rejects_coincident_pylons() {
        let base = MissionPlan::default();
        let plan = MissionPlan { pylon2: base.pylon1, ..base };
        assert!(check_mission(&plan).is_err());
    }
}
