//! Simulated fleet telemetry.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use skyfleet_domain::TelemetryEvent;

/// Degrees of latitude/longitude a vehicle may drift per tick
const MAX_STEP_DEG: f64 = 0.0005;

#[derive(Debug, Clone)]
struct SimulatedVehicle {
    external_id: String,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    heading: f64,
    battery: f64,
}

/// Random-walk telemetry for a small fleet around a home position
pub struct FleetSimulator {
    vehicles: Vec<SimulatedVehicle>,
    rng: StdRng,
}

impl FleetSimulator {
    #[must_use]
    pub fn new(prefix: &str, count: usize, home: (f64, f64), seed: Option<u64>) -> Self {
        let mut rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let vehicles = (1..=count)
            .map(|n| SimulatedVehicle {
                external_id: format!("{prefix}-{n:03}"),
                latitude: home.0 + rng.gen_range(-0.01..0.01),
                longitude: home.1 + rng.gen_range(-0.01..0.01),
                altitude: rng.gen_range(80.0..140.0),
                heading: rng.gen_range(0.0..360.0),
                battery: rng.gen_range(70.0..100.0),
            })
            .collect();
        Self { vehicles, rng }
    }

    /// Advance every vehicle one step and emit its telemetry
    pub fn tick(&mut self) -> Vec<TelemetryEvent> {
        let now = Utc::now();
        let rng = &mut self.rng;
        self.vehicles
            .iter_mut()
            .map(|v| {
                v.latitude = (v.latitude + rng.gen_range(-MAX_STEP_DEG..MAX_STEP_DEG)).clamp(-90.0, 90.0);
                v.longitude = (v.longitude + rng.gen_range(-MAX_STEP_DEG..MAX_STEP_DEG)).clamp(-180.0, 180.0);
                v.altitude = (v.altitude + rng.gen_range(-2.0..2.0)).max(0.0);
                v.heading = (v.heading + rng.gen_range(-10.0..10.0)).rem_euclid(360.0) % 360.0;
                v.battery = (v.battery - rng.gen_range(0.0..0.2)).max(0.0);

                TelemetryEvent {
                    speed_mps: Some(rng.gen_range(8.0..18.0)),
                    heading_deg: Some(v.heading),
                    battery_pct: Some(v.battery),
                    temperature_c: Some(rng.gen_range(18.0..32.0)),
                    signal_dbm: Some(rng.gen_range(-80.0..-50.0)),
                    ..TelemetryEvent::at(&v.external_id, v.latitude, v.longitude, v.altitude, now)
                }
            })
            .collect()
    }
}
