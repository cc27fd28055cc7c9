use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::{debug, info};

use kube_sizing_reporter::kubernetes::{collect_clusters, CollectOptions};
use kube_sizing_reporter::model::schema;
use kube_sizing_reporter::types::ClusterSnapshot;
use kube_sizing_reporter::{analyze, condense, helm, io, model, report};

/// Inspect Kubernetes cluster inventory and report sizing headroom for
/// agent deployments.
#[derive(Parser)]
#[command(name = "kube-sizing-reporter", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect sizing inventory from clusters and write a condensed file
    Collect {
        /// Path to kubeconfig file (client default if omitted)
        #[arg(short, long, env = "KUBECONFIG")]
        kubeconfig: Option<PathBuf>,

        /// kubectl context to pull from (all contexts if omitted)
        #[arg(short, long)]
        context: Option<String>,

        /// Output file
        #[arg(short, long, default_value = "clusterinfo.json.gz")]
        output: PathBuf,
    },
    /// Analyze a collected inventory or model file and report warnings
    Analyze {
        /// Input file (plain or gzipped JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Type of input document
        #[arg(short = 't', long = "type", value_enum, default_value_t = InputType::Kubectl)]
        input_type: InputType,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Cluster name to report on (all clusters if omitted)
        #[arg(short, long)]
        cluster: Option<String>,

        /// Write per-cluster helm values files with agent tolerations
        #[arg(long)]
        helm_values: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum InputType {
    /// Condensed per-cluster document, as written by `collect`
    Kubectl,
    /// Flat stream of timestamped model records
    Model,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Collect { kubeconfig, context, output } => {
            let options = CollectOptions { kubeconfig, context };
            let clusters = collect_clusters(&options).await?;
            if clusters.is_empty() {
                bail!("no clusters yielded any resources");
            }
            let condensed = condense(&clusters);
            io::write_condensed(&condensed, &output)?;
            println!(
                "{} collected {} cluster(s) into {}",
                "✓".green().bold(),
                condensed.len(),
                output.display()
            );
        }
        Commands::Analyze { input, input_type, format, cluster, helm_values } => {
            let condensed = load_clusters(&input, input_type)?;
            if let Some(wanted) = &cluster {
                if !condensed.contains_key(wanted) {
                    bail!("cluster {wanted} not present in {}", input.display());
                }
            }
            let analyzed = analyze(condensed);

            match format {
                OutputFormat::Text => println!("{}", report::render_text(&analyzed, cluster.as_deref())),
                OutputFormat::Json => println!("{}", report::render_json(&analyzed)?),
            }

            if helm_values {
                let written = helm::write_helm_values(&analyzed, std::path::Path::new("."))?;
                for path in &written {
                    println!("{} wrote {}", "✓".green().bold(), path.display());
                }
                if written.is_empty() {
                    println!("{} no taints found, no values files written", "ℹ".blue().bold());
                }
            }
        }
    }

    Ok(())
}

fn load_clusters(
    input: &std::path::Path,
    input_type: InputType,
) -> Result<BTreeMap<String, ClusterSnapshot>> {
    let reader = io::open_input(input)?;
    match input_type {
        InputType::Kubectl => io::load_condensed(reader),
        InputType::Model => {
            let records = io::load_model_records(reader)?;
            let reduced = model::last_models(records, schema::K8S_DEFAULTS);
            info!(records = reduced.len(), "reduced model stream");
            if let Some(horizon) = reduced.horizon() {
                debug!(%horizon, "model data horizon");
            }
            let indexed = model::index_models(reduced)?;
            Ok(condense(&indexed))
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}
