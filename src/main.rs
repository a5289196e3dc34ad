use std::time::{Duration, Instant};

use clap::{App, AppSettings, Arg, SubCommand};

use string_sph::{floating_type_mod::FT, init_sandbox, Sandbox, SceneConfig, SimulationConfig};

const CARGO_PKG_VERSION: &'static str = env!("CARGO_PKG_VERSION");
const CARGO_PKG_DESCRIPTION: &'static str = env!("CARGO_PKG_DESCRIPTION");

fn main() {
    let matches = App::new("String-Coupled SPH Sandbox")
        .version(CARGO_PKG_VERSION)
        .about(CARGO_PKG_DESCRIPTION)
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("run")
                .about("Run the coupled simulation headlessly with the given configs")
                .arg(
                    Arg::with_name("SIMULATION_CONFIG")
                        .help("Solver parameters (YAML)")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::with_name("SCENE_CONFIG")
                        .help("Scene setup (YAML)")
                        .required(true)
                        .index(2),
                )
                .arg(
                    Arg::with_name("MAX_SECONDS")
                        .long("max-seconds")
                        .short("s")
                        .takes_value(true)
                        .default_value("10")
                        .help("Stop after the given amount of simulated seconds"),
                )
                .arg(
                    Arg::with_name("DT")
                        .long("dt")
                        .takes_value(true)
                        .default_value("0.008333")
                        .help("Fixed step size in seconds"),
                )
                .arg(
                    Arg::with_name("PLUCK")
                        .long("pluck")
                        .takes_value(true)
                        .help("Pluck the string at start: normalized position and amplitude, e.g. 0.5,0.3"),
                )
                .arg(
                    Arg::with_name("REPORT_EVERY")
                        .long("report-every")
                        .takes_value(true)
                        .default_value("60")
                        .help("Print statistics every N steps"),
                ),
        )
        .get_matches();

    if let Some(run_matches) = matches.subcommand_matches("run") {
        let parameter_file = run_matches
            .value_of("SIMULATION_CONFIG")
            .expect("missing simulation config");
        let params_yaml = std::fs::read_to_string(parameter_file).expect("failed reading parameter file");
        let config: SimulationConfig =
            serde_yaml::from_str(&params_yaml).expect("failed parsing simulation config file");
        println!("{:?}", config);

        let scene_file = run_matches.value_of("SCENE_CONFIG").expect("missing scene config");
        let scene_yaml = std::fs::read_to_string(scene_file).expect("failed reading scene file");
        let scene: SceneConfig = serde_yaml::from_str(&scene_yaml).expect("failed parsing scene config file");
        println!("{:?}", scene);

        let max_seconds = run_matches
            .value_of("MAX_SECONDS")
            .unwrap()
            .parse::<FT>()
            .expect("--max-seconds must be a number");
        let dt = run_matches
            .value_of("DT")
            .unwrap()
            .parse::<FT>()
            .expect("--dt must be a number");
        let report_every = run_matches
            .value_of("REPORT_EVERY")
            .unwrap()
            .parse::<usize>()
            .expect("--report-every must be an integer");
        assert!(dt > 0., "--dt must be positive");

        let mut sandbox =
            init_sandbox(&config, &scene).unwrap_or_else(|error| panic!("failed to initialize sandbox: {}", error));
        println!(
            "INIT {} FLUID PARTICLES, {} STRING NODES",
            sandbox.fluid.particle_count(),
            sandbox.string.node_count()
        );

        if let Some(pluck) = run_matches.value_of("PLUCK") {
            let values: Vec<FT> = pluck
                .split(',')
                .map(|value| value.parse().expect("bad --pluck value"))
                .collect();
            assert!(values.len() == 2, "--pluck expects POSITION,AMPLITUDE");
            sandbox.string.pluck_string(values[0], values[1]);
        }

        run_headless(sandbox, dt, max_seconds, report_every.max(1));
    } else {
        unreachable!()
    }
}

fn run_headless(mut sandbox: Sandbox, dt: FT, max_seconds: FT, report_every: usize) {
    let mut total_duration: Duration = Duration::from_nanos(0);
    let mut total_number_of_frames: u32 = 0;

    while sandbox.time < max_seconds {
        let a = Instant::now();
        sandbox.step(dt);
        let b = Instant::now();

        total_duration += b - a;
        total_number_of_frames += 1;

        if sandbox.step_number() % report_every == 0 {
            let max_speed = sandbox
                .fluid
                .particles
                .velocity
                .iter()
                .map(|velocity| velocity.norm())
                .fold(0., |acc, speed| FT::max(acc, speed));

            println!(
                "{:05}: t={:.3}s {} fluid particles, max speed {:.3}, {:.3}msec ({:.3}msec AVG)",
                sandbox.step_number(),
                sandbox.time,
                sandbox.fluid.particle_count(),
                max_speed,
                (b - a).as_secs_f32() * 1000.,
                (total_duration / total_number_of_frames).as_secs_f32() * 1000.
            );
        }
    }

    println!(
        "simulated {:.3}s in {} steps ({:.3}msec AVG)",
        sandbox.time,
        total_number_of_frames,
        (total_duration / total_number_of_frames.max(1)).as_secs_f32() * 1000.
    );
}
