use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rust_vslam_ar::config::ViewerConfig;
use rust_vslam_ar::geometry::SE3;
use rust_vslam_ar::io::load_pose_csv;
use rust_vslam_ar::sim::{SimConfig, SimulatedBackend, circle_pose};
use rust_vslam_ar::system::{SlamBackend, ViewerSystem};
use rust_vslam_ar::viz::rerun::RerunVisualizer;

/// Frames per simulated revolution when no trajectory file is given.
const CIRCLE_STEPS: usize = 600;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/viewer.yaml".to_string());
    let config = ViewerConfig::load_or_default(Path::new(&config_path))?;
    info!("Loaded config from {}", config_path);

    // Ground-truth camera poses to replay, with timestamps.
    let truth: Vec<(u64, SE3)> = match std::env::args().nth(2) {
        Some(csv) => {
            let entries = load_pose_csv(&csv)?;
            println!("Loaded {} poses from {}", entries.len(), csv);
            entries.into_iter().map(|e| (e.timestamp_ns, e.pose)).collect()
        }
        None => (0..=CIRCLE_STEPS)
            .map(|i| (i as u64 * 50_000_000, circle_pose(i, CIRCLE_STEPS, 2.0)))
            .collect(),
    };
    if truth.is_empty() {
        anyhow::bail!("No poses to replay");
    }

    let sim = SimulatedBackend::new(SimConfig::default());
    let mut system = ViewerSystem::new(&config, sim.clone());
    let trigger = system.placement_trigger();

    let mut viz = match RerunVisualizer::new(&config.visualization) {
        Ok(viz) => Some(viz),
        Err(e) => {
            warn!("Visualization disabled: {:#}", e);
            None
        }
    };

    let n = truth.len();
    let lost_at = n / 3;
    let merge_at = n / 2;
    let loop_at = 3 * n / 4;
    let mut lost_map = None;

    for (i, (timestamp_ns, t_wc_true)) in truth.iter().enumerate() {
        if i == lost_at {
            sim.set_reset(true);
            lost_map = Some(sim.start_new_map());
        } else if i == lost_at + 1 {
            sim.set_reset(false);
        }

        if i == 0 || i == n - 1 {
            trigger.place_error_marker();
        } else if i % 40 == 0 {
            trigger.place_cube();
        }

        system.push_event(sim.track(*timestamp_ns, t_wc_true))?;

        if i == merge_at {
            if let Some(merged) = lost_map.and_then(|m| sim.merge(m, 0, &SE3::identity())) {
                system.push_event(merged)?;
            }
        }
        if i == loop_at {
            system.push_event(sim.close_loop())?;
        }

        if let Some(viz) = viz.as_mut() {
            viz.log_snapshot(&system.snapshot());
        }

        if i % 100 == 0 {
            println!(
                "Frame {}/{}: active map {}, {} keyframes",
                i,
                n,
                sim.active_map_index(),
                sim.num_keyframes(sim.active_map_index())
            );
        }
    }

    // Applies everything still queued.
    system.shutdown();
    if let Some(viz) = viz.as_mut() {
        viz.log_snapshot(&system.snapshot());
    }

    let stats = system.stats();
    println!(
        "Done! {} frames, {} map switches, {} loop closures, {} merges, {} anchors",
        stats.frames, stats.map_switches, stats.loop_closures, stats.merges, stats.anchors_placed
    );

    match system.drift_report() {
        Some(report) => println!("{}", report),
        None => println!("No error markers placed"),
    }

    Ok(())
}
