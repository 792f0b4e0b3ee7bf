//! referenda-tester
//!
//! Validates a simulation request, queries the chains it names and prints the
//! fork topology a run would use.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use referenda_tester::chain::RpcClient;
use referenda_tester::config::loader::RunFile;
use referenda_tester::config::{RunnerConfig, SimulationRequest};
use referenda_tester::referendum::{tracks_for, Domain};
use referenda_tester::topology::{ChainDescriptor, ChainTopologyBuilder, Network};

#[derive(Parser)]
#[command(name = "referenda-tester")]
#[command(about = "Dry-run governance referenda against forked chain state")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a request and print the fork topology it needs
    Plan {
        /// YAML run file; flags given on the command line take precedence
        #[arg(short, long)]
        file: Option<PathBuf>,

        #[command(flatten)]
        request: RequestArgs,
    },
    /// List the referendum tracks of a network
    Tracks {
        /// polkadot, kusama, ...
        #[arg(short, long, default_value = "polkadot")]
        network: String,

        /// Show fellowship tracks instead of governance tracks
        #[arg(long)]
        fellowship: bool,
    },
}

#[derive(Args, Default)]
struct RequestArgs {
    /// Governance chain endpoint, optionally pinned: <url>[,<block>]
    #[arg(long)]
    governance_chain_url: Option<String>,

    /// Fellowship chain endpoint, optionally pinned: <url>[,<block>]
    #[arg(long)]
    fellowship_chain_url: Option<String>,

    /// Extra chains to monitor: <url>[,<block>],<url>...
    #[arg(long)]
    additional_chains: Option<String>,

    /// Governance referendum id
    #[arg(long)]
    referendum: Option<String>,

    /// Fellowship referendum id
    #[arg(long)]
    fellowship: Option<String>,

    #[arg(long)]
    call_to_create_governance_referendum: Option<String>,

    #[arg(long)]
    call_to_note_preimage_for_governance_referendum: Option<String>,

    #[arg(long)]
    call_to_create_fellowship_referendum: Option<String>,

    #[arg(long)]
    call_to_note_preimage_for_fellowship_referendum: Option<String>,

    /// Call dispatched on the governance chain before any referendum
    #[arg(long)]
    pre_call: Option<String>,

    /// Origin of the pre-call: root, <Caller>:<Variant> or JSON
    #[arg(long)]
    pre_origin: Option<String>,

    /// Leave forks running after the run
    #[arg(long)]
    no_cleanup: bool,
}

impl RequestArgs {
    /// Overlay these flags on a request loaded from a file.
    fn apply(self, mut request: SimulationRequest) -> SimulationRequest {
        macro_rules! overlay {
            ($($field:ident),*) => {
                $(if self.$field.is_some() {
                    request.$field = self.$field;
                })*
            };
        }
        overlay!(
            governance_chain_url,
            fellowship_chain_url,
            additional_chains,
            referendum,
            fellowship,
            call_to_create_governance_referendum,
            call_to_note_preimage_for_governance_referendum,
            call_to_create_fellowship_referendum,
            call_to_note_preimage_for_fellowship_referendum,
            pre_call,
            pre_origin
        );
        request.no_cleanup |= self.no_cleanup;
        request
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "referenda_tester=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Plan { file, request } => plan(file, request).await,
        Commands::Tracks {
            network,
            fellowship,
        } => {
            let network = Network::from_spec_name(&network);
            if network == Network::Unknown {
                return Err(anyhow!("unknown network"));
            }
            let domain = if fellowship {
                Domain::Fellowship
            } else {
                Domain::Main
            };
            for track in tracks_for(domain, network) {
                println!("{:>4}  {}", track.id, track.name);
            }
            Ok(())
        }
    }
}

async fn plan(file: Option<PathBuf>, args: RequestArgs) -> Result<()> {
    let (request, runner) = match file {
        Some(path) => {
            let run_file = RunFile::load(&path)?;
            let runner = run_file.runner_config()?;
            (args.apply(run_file.request), runner)
        }
        None => (args.apply(SimulationRequest::default()), RunnerConfig::load()?),
    };

    let plan = request.validate()?;
    info!("Request is valid");

    let mut descriptors = Vec::new();
    for (role, endpoint) in ChainTopologyBuilder::plan_roles(&plan) {
        let spec_name = RpcClient::new(&endpoint.url)
            .spec_name()
            .await
            .with_context(|| format!("failed to query {} chain {}", role, endpoint.url))?;
        descriptors.push((role, ChainDescriptor::from_spec_name(&endpoint, &spec_name)));
    }

    let topology = ChainTopologyBuilder::from_plan(&plan, descriptors, &runner);

    println!("{:<16} {:<24} {:<10} {:<10} {}", "KEY", "CHAIN", "KIND", "BLOCK", "ROLES");
    for (key, entry) in &topology.entries {
        let roles: Vec<String> = entry.roles.iter().map(|r| r.label()).collect();
        let block = entry
            .fork_config
            .block
            .map(|b| b.to_string())
            .unwrap_or_else(|| "latest".to_string());
        println!(
            "{:<16} {:<24} {:<10} {:<10} {}",
            key,
            entry.descriptor.label,
            format!("{:?}", entry.descriptor.kind).to_lowercase(),
            block,
            roles.join(",")
        );
    }
    println!(
        "\nrelay wiring: {}",
        if topology.wired { "on" } else { "off" }
    );
    Ok(())
}
