use clap::{App, Arg, ArgMatches};
use std::error::Error;
use std::process::ExitCode;
use std::time::Instant;
use tinystack::{Engine, EngineConfig, HaltMode, Listing};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn args() -> ArgMatches {
    App::new("tinystack")
        .about("a tiny stack-based bytecode interpreter")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .takes_value(true)
                .required(true)
                .help("token listing to execute, e.g. a file containing `PUSH 3 PUSH 4 ADD`"),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .takes_value(false)
                .required(false)
                .help("fails if more than one value is left on the stack when the program halts"),
        )
        .arg(
            Arg::new("max-steps")
                .short('n')
                .long("max-steps")
                .takes_value(true)
                .required(false)
                .help("aborts after executing this many instructions"),
        )
        .arg(
            Arg::new("max-stack")
                .short('s')
                .long("max-stack")
                .takes_value(true)
                .required(false)
                .help("maximum operand stack depth"),
        )
        .arg(
            Arg::new("disassemble")
                .short('i')
                .long("disassemble")
                .takes_value(false)
                .required(false)
                .help("prints the disassembled instruction stream instead of executing it"),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .takes_value(false)
                .required(false)
                .help("logs every executed instruction together with the stack"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .takes_value(false)
                .required(false)
                .help("suppresses all output other than the result"),
        )
        .get_matches()
}

/// Use `RUST_LOG` to override the filter picked from the command line flags
fn init_logging(debug: bool, quiet: bool) {
    let default = match (debug, quiet) {
        (true, _) => "debug",
        (false, true) => "error",
        (false, false) => "warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn config(args: &ArgMatches) -> Result<EngineConfig, Box<dyn Error>> {
    let mut config = EngineConfig::default()
        .with_trace(args.is_present("debug"))
        .with_step_limit(args.value_of("max-steps").map(str::parse::<usize>).transpose()?);
    if args.is_present("strict") {
        config = config.with_halt(HaltMode::Strict);
    }
    if let Some(depth) = args.value_of("max-stack") {
        config = config.with_max_stack_depth(depth.parse()?);
    }

    Ok(config)
}

fn run(args: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let file_name = args.value_of("file").unwrap_or_default();
    let config = config(args)?;

    let start = Instant::now();
    let stream = Listing::open(file_name)?.into_stream()?;
    info!(
        tokens = stream.len(),
        elapsed_ns = start.elapsed().as_nanos() as u64,
        "loaded {}",
        file_name
    );

    if args.is_present("disassemble") {
        print!("{}", stream.disassemble());

        return Ok(());
    }

    let engine = Engine::new(config);
    let start = Instant::now();
    let value = engine.execute(&stream)?;
    info!(elapsed_ns = start.elapsed().as_nanos() as u64, "executed");
    println!("stacktop: {}", value);

    Ok(())
}

fn main() -> ExitCode {
    let args = args();
    init_logging(args.is_present("debug"), args.is_present("quiet"));

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}
