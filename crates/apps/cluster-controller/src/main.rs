mod config;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use config::ClusterControllerConfig;
use svcbus_address::Address;
use svcbus_arbitrator::Arbitrator;
use svcbus_capabilities_directory::LocalCapabilitiesDirectory;
use svcbus_gcd_client::test_support::InMemoryGcdClient;
use svcbus_gcd_client::KnownGbids;
use svcbus_message::Message;
use svcbus_router::Router;
use svcbus_transport::{MessagingStub, MessagingStubFactory, MulticastAddressCalculator, TransmitError};

#[derive(Parser, Debug)]
#[command(name = "cluster-controller")]
struct Args {
    #[arg(long, default_value = "cluster-controller.toml")]
    config: PathBuf,
    #[arg(long)]
    cluster_controller_id: Option<String>,
}

/// Logs and drops every send — wiring a concrete wire transport is outside
/// this binary's job; it only proves the router/directory/arbitrator graph
/// runs end to end.
struct LoggingStub;

#[async_trait]
impl MessagingStub for LoggingStub {
    async fn transmit(&self, message: &Message) -> Result<(), TransmitError> {
        log::debug!("would transmit {}", message.tracking_info());
        Ok(())
    }
}

struct LoggingStubFactory;

impl MessagingStubFactory for LoggingStubFactory {
    fn create(&self, address: &Address) -> Option<Box<dyn MessagingStub>> {
        log::debug!("creating stub for {address:?}");
        Some(Box::new(LoggingStub))
    }
}

struct NoMulticastCalculator;

impl MulticastAddressCalculator for NoMulticastCalculator {
    fn calculate(&self, _message: &Message) -> Vec<Address> {
        Vec::new()
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();
    let mut config = ClusterControllerConfig::load(&args.config);
    if let Some(id) = args.cluster_controller_id {
        config.cluster_controller_id = id;
    }

    let router = Router::new(
        None,
        Arc::new(LoggingStubFactory),
        Arc::new(NoMulticastCalculator),
        None,
        Vec::new(),
        config.router.clone(),
    );
    router.start_maintenance();

    let known_gbids = KnownGbids::new(config.known_gbids.clone(), config.default_gbid.clone());
    let gcd_client = Arc::new(InMemoryGcdClient::new());
    let directory = LocalCapabilitiesDirectory::new(
        config.cluster_controller_id.clone(),
        gcd_client,
        router.clone(),
        known_gbids,
        None,
        config.lcd.clone(),
    );
    directory.start_maintenance();

    let arbitrator = Arbitrator::new(directory.clone());

    log::info!(
        "cluster controller '{}' running with gbids {:?}",
        config.cluster_controller_id,
        config.known_gbids
    );

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    log::info!("shutting down");

    arbitrator.stop_arbitration();
    directory.shutdown().await;
    router.shutdown().await;
}
