use airflow_sim_core::{
    analyze_history, AirflowSimulation, Collidable, SimulationConfig, Triangle, Vec3, WindSource,
};
use clap::Parser;
use nalgebra::{Isometry3, Translation3, UnitQuaternion};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Headless airflow simulation with recording and export
#[derive(Parser, Debug)]
#[command(name = "airflow-sim-demo")]
#[command(about = "Two-source airflow scene over a ground plane", long_about = None)]
struct Args {
    /// Simulation duration in seconds
    #[arg(short, long, default_value_t = 10.0)]
    duration: f32,

    /// Time step in seconds
    #[arg(long, default_value_t = 1.0 / 60.0)]
    dt: f32,

    /// RNG seed (overrides the config file)
    #[arg(short, long)]
    seed: Option<u64>,

    /// JSON configuration file; missing fields take defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Particles emitted per second by each source (overrides the config file)
    #[arg(short, long)]
    emission_rate: Option<f32>,

    /// Minimum seconds between recorded frames (overrides the config file)
    #[arg(long)]
    record_interval: Option<f32>,

    /// Resting particles scattered through the domain at start
    #[arg(long, default_value_t = 0)]
    ambient: usize,

    /// Wind speed of the primary source (m/s)
    #[arg(short, long, default_value_t = 10.0)]
    wind_speed: f32,

    /// Export path (defaults to simulation_data_<unix time>.json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip recording and export
    #[arg(long)]
    no_record: bool,

    /// Report interval in seconds
    #[arg(short, long, default_value_t = 1.0)]
    report_interval: f32,
}

/// Unit cube mesh centred on the origin
fn unit_cube() -> (Vec<Vec3>, Vec<[usize; 3]>) {
    let vertices = vec![
        Vec3::new(-0.5, -0.5, -0.5),
        Vec3::new(0.5, -0.5, -0.5),
        Vec3::new(0.5, 0.5, -0.5),
        Vec3::new(-0.5, 0.5, -0.5),
        Vec3::new(-0.5, -0.5, 0.5),
        Vec3::new(0.5, -0.5, 0.5),
        Vec3::new(0.5, 0.5, 0.5),
        Vec3::new(-0.5, 0.5, 0.5),
    ];
    let indices = vec![
        [0, 2, 1],
        [0, 3, 2],
        [4, 5, 6],
        [4, 6, 7],
        [0, 1, 5],
        [0, 5, 4],
        [3, 7, 6],
        [3, 6, 2],
        [0, 4, 7],
        [0, 7, 3],
        [1, 2, 6],
        [1, 6, 5],
    ];
    (vertices, indices)
}

fn build_config(args: &Args) -> Result<SimulationConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            SimulationConfig::load(path)?
        }
        None => SimulationConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(rate) = args.emission_rate {
        config.emission_rate = rate;
    }
    if let Some(interval) = args.record_interval {
        config.recorder.min_interval = interval;
    }
    config.validate()?;
    Ok(config)
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Airflow Simulation Demo ===\n");

    let config = build_config(args)?;
    let mut sim = AirflowSimulation::new(config)?;
    let (min, max) = sim.field().bounds();
    let (nx, ny, nz) = sim.field().dims();
    println!(
        "Field: {}x{}x{} cells over ({:.1}, {:.1}, {:.1}) .. ({:.1}, {:.1}, {:.1})",
        nx, ny, nz, min.x, min.y, min.z, max.x, max.y, max.z
    );

    // Two opposing blowers
    sim.add_source(WindSource::new(
        Vec3::new(2.0, 1.0, 0.0),
        3.0,
        args.wind_speed,
        -Vec3::x(),
        20.0,
    )?);
    sim.add_source(WindSource::new(
        Vec3::new(-2.0, 1.0, 0.0),
        2.0,
        args.wind_speed * 0.5,
        Vec3::x(),
        20.0,
    )?);
    println!("Added {} wind sources", sim.source_count());

    // Scene: 20 x 20 m ground plane and a rotated crate between the sources
    let ground = Triangle::quad(
        Vec3::new(-10.0, 0.0, -10.0),
        Vec3::new(-10.0, 0.0, 10.0),
        Vec3::new(10.0, 0.0, 10.0),
        Vec3::new(10.0, 0.0, -10.0),
    );
    let (vertices, indices) = unit_cube();
    let crate_pose = Isometry3::from_parts(
        Translation3::new(0.0, 0.5, 1.5),
        UnitQuaternion::from_axis_angle(&Vec3::y_axis(), 0.4),
    );
    let obstacle = Triangle::from_indexed_mesh(&vertices, &indices, &crate_pose);
    println!("Scene: {} ground + {} obstacle triangles", ground.len(), obstacle.len());

    if args.ambient > 0 {
        let spawned = sim.spawn_ambient(args.ambient);
        println!("Scattered {} ambient particles", spawned);
    }

    if !args.no_record {
        sim.start_recording();
    }

    let dt = args.dt;
    let steps = (args.duration / dt).ceil() as usize;
    let report_every = ((args.report_interval / dt).round() as usize).max(1);

    println!("\nRunning {} steps of {:.4}s...\n", steps, dt);
    println!("Time(s) | Particles | Emitted | Expired | Collisions | Max wind (m/s)");
    println!("--------|-----------|---------|---------|------------|---------------");

    let mut emitted = 0;
    let mut expired = 0;
    let mut collisions = 0;
    for step in 1..=steps {
        let collidables = [Collidable::new(&ground), Collidable::new(&obstacle)];
        let report = sim.step(dt, &collidables);
        emitted += report.emitted;
        expired += report.particles.expired;
        collisions += report.particles.collisions;

        if step % report_every == 0 || step == steps {
            println!(
                "{:7.2} | {:9} | {:7} | {:7} | {:10} | {:14.2}",
                report.time,
                report.particles.alive,
                emitted,
                expired,
                collisions,
                sim.field().max_speed()
            );
            emitted = 0;
            expired = 0;
            collisions = 0;
        }
    }
    sim.stop_recording();

    println!("\n=== Simulation Complete ===");
    println!("Final time: {:.2}s", sim.time());
    println!("Live particles: {}", sim.particles().len());
    let sample_point = Vec3::new(0.0, 1.0, 0.0);
    let wind = sim.sample_field(sample_point);
    println!(
        "Wind at ({:.1}, {:.1}, {:.1}): ({:.2}, {:.2}, {:.2}) m/s",
        sample_point.x, sample_point.y, sample_point.z, wind.x, wind.y, wind.z
    );

    if args.no_record {
        return Ok(());
    }

    let history = sim.recorder().history();
    println!("\nRecorded {} frames", history.len());
    match analyze_history(history) {
        Ok(summary) => {
            println!(
                "Time range: {:.2}s to {:.2}s",
                summary.time_range.0, summary.time_range.1
            );
            println!(
                "Position range: {:.2} to {:.2}",
                summary.position_range.0, summary.position_range.1
            );
            println!(
                "Velocity range: {:.2} to {:.2}",
                summary.velocity_range.0, summary.velocity_range.1
            );
            if let (Some(first), Some(last)) = (summary.samples.first(), summary.samples.last()) {
                println!(
                    "Mean speed: {:.2} m/s (t={:.2}s) -> {:.2} m/s (t={:.2}s)",
                    first.speed(),
                    first.timestamp,
                    last.speed(),
                    last.timestamp
                );
            }
        }
        Err(e) => println!("Analysis skipped: {e}"),
    }

    let path = match &args.output {
        Some(path) => path.clone(),
        None => {
            let stamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            PathBuf::from(format!("simulation_data_{stamp}.json"))
        }
    };
    sim.recorder().export_to_file(&path)?;
    println!("Exported history to {}", path.display());

    Ok(())
}

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    if !(args.dt.is_finite() && args.dt > 0.0) {
        error!("Time step must be positive, got {}", args.dt);
        return std::process::ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            std::process::ExitCode::FAILURE
        }
    }
}
