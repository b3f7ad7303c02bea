//! Main function reading the configuration, dialing the Greeter server
//! and running the request loop.

use dotenv::dotenv;
use greeter_client::grpc::{self, DialTarget, LoopSettings, Mode};
use greeter_client::resolver::ResolverRegistry;
use greeter_client::{grpc_error, grpc_info, logger, shutdown_signal, Cli, Config, Parser};

#[tokio::main]
#[cfg(not(tarpaulin_include))]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Start Logger first so configuration problems are reported
    if let Err(e) = logger::init_logger(&Config::log_config_from_env()) {
        eprintln!("(logger) could not start logger: {}", e);
    }

    // Will use default config settings if no environment vars are found.
    let config = Config::load();

    let args = Cli::parse();

    // Resolvers are only needed when the address has to be discovered
    let mode = config.mode();
    let registry = match mode {
        Mode::Kubernetes => match ResolverRegistry::in_cluster().await {
            Ok(registry) => registry,
            Err(e) => {
                grpc_error!("did not connect: {}", e);
                std::process::exit(1);
            }
        },
        Mode::Direct => ResolverRegistry::new(),
    };

    let target = DialTarget::new(&config.server, mode);
    let mut client = match grpc::dial(&target, &registry) {
        Ok(channel) => grpc::Client::new(channel),
        Err(e) => {
            grpc_error!("did not connect: {}", e);
            std::process::exit(1);
        }
    };

    let settings = LoopSettings::new(args.name, &config);
    if let Err(e) = grpc::run(&mut client, &settings, shutdown_signal("greeter", None)).await {
        grpc_error!("could not greet: {}", e);
        std::process::exit(1);
    }

    grpc_info!("Client shutdown.");
    Ok(())
}
