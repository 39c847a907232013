use smokepack::cli::commands::CliArgs;
use smokepack::cli::output::OutputFormatter;
use smokepack::util::logging::{config_from_env, init_logging, parse_level};
use smokepack::{Suite, Toolchain, NAME, VERSION};

use clap::Parser;
use std::process;
use std::sync::Arc;
use tracing::{debug, error, info, Level};

/// Every scenario passed
const EXIT_SUCCESS: i32 = 0;
/// At least one scenario failed, or the suite could not run
const EXIT_FAILURE: i32 = 1;
/// Bad builder name or descriptor; nothing was run
const EXIT_CONFIG_ERROR: i32 = 2;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("{} v{} starting", NAME, VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = handle_run(&args).await;

    process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let mut config = config_from_env();

    if let Some(level_str) = &args.log_level {
        config.level = parse_level(level_str);
    } else if args.verbose {
        config.level = Level::DEBUG;
    } else if args.quiet {
        config.level = Level::ERROR;
    }

    init_logging(config);
}

async fn handle_run(args: &CliArgs) -> i32 {
    let config = match args.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            eprintln!("\nPlease check --name, the descriptor file and your environment variables.");
            return EXIT_CONFIG_ERROR;
        }
    };
    debug!("{}", config);

    let toolchain = match Toolchain::local() {
        Ok(toolchain) => toolchain,
        Err(e) => {
            error!("Failed to set up the local toolchain: {}", e);
            eprintln!("\nPossible solutions:");
            eprintln!("  - Ensure the Docker daemon is running");
            eprintln!("  - Check the DOCKER_HOST environment variable");
            return EXIT_FAILURE;
        }
    };

    let suite = Suite::buildpackless(Arc::new(config), toolchain);
    info!("Running {} ({} scenarios)", suite.name(), suite.len());
    let report = suite.run().await;

    let formatter = OutputFormatter::new(args.format.into());
    match formatter.format(&report) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!("Failed to render report: {:#}", e);
            return EXIT_FAILURE;
        }
    }

    if report.passed() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    }
}
