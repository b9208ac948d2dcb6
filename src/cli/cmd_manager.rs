// Manager command - run one support bundle to completion
use anyhow::{Context, Result};
use clap::{Args, ValueHint};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use supportbundle::constants;
use supportbundle::sources::{KubectlSource, RemoteBundleSource};
use supportbundle::{
    BundleRequest, Collaborators, Coordinator, FileStatusStore, LingerPolicy,
};
use tokio::runtime::Runtime;

fn parse_duration_for_clap(s: &str) -> Result<Duration, String> {
    supportbundle::server::parse_duration(s).map_err(|e| e.to_string())
}

fn parse_linger_for_clap(s: &str) -> Result<LingerPolicy, String> {
    s.parse::<LingerPolicy>().map_err(|e| e.to_string())
}

#[derive(Args)]
#[command(
    about = "Generate the cluster bundle and collect node bundles",
    long_about = "Run the support bundle manager for one bundle request.

The manager checks that the request is in the 'generating' state, collects
cluster manifests, pod logs and the external bundle into the working
directory, and records 'managerdone'. It then accepts node bundles on
POST /bundle/nodes/{node} until every expected node has reported or the wait
timeout expires. When all nodes reported, the working directory is compressed
into one zip archive, 'agentdone' is recorded and the archive is served on
GET /bundle/download. Any failure is recorded as 'error' with a detail.

The process exits non-zero when the request ended in 'error'.",
    help_template = crate::clap_help!(
        examples: "  # Wait for three nodes\n  \
                   {bin} manager --namespace harvester-system --bundlename sb-1 --nodecount 3\n\n  \
                   # Shorter wait, stop serving 10 minutes after the outcome\n  \
                   {bin} manager --bundlename sb-1 --nodecount 3 --wait 2m --linger 10m\n\n  \
                   # Without the external bundle\n  \
                   {bin} manager --bundlename sb-1 --nodecount 1 --external-api ''"
    )
)]
pub struct ManagerCommand {
    /// Namespace of the support bundle request
    #[arg(long, env = "SUPPORT_BUNDLE_NAMESPACE", default_value = "", help_heading = "Request Options")]
    pub namespace: String,

    /// Name of the support bundle request
    #[arg(long = "bundlename", env = "SUPPORT_BUNDLE_NAME", default_value = "", help_heading = "Request Options")]
    pub bundle_name: String,

    /// Number of node bundles to wait for
    #[arg(long = "nodecount", env = "SUPPORT_BUNDLE_NODE_COUNT", default_value = "0", help_heading = "Request Options")]
    pub node_count: usize,

    /// How long to wait for node bundles
    #[arg(long, env = "SUPPORT_BUNDLE_WAIT_TIMEOUT", default_value = "5m", value_parser = parse_duration_for_clap, help_heading = "Request Options")]
    pub wait: Duration,

    /// Output directory (defaults to <tmp>/support-bundle)
    #[arg(long = "outdir", env = "SUPPORT_BUNDLE_OUTPUT_DIR", help_heading = "Request Options", value_hint = ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,

    /// Issue URL recorded in the bundle metadata
    #[arg(long, env = "SUPPORT_BUNDLE_ISSUE_URL", default_value = "", help_heading = "Request Options")]
    pub issue_url: String,

    /// Issue description recorded in the bundle metadata
    #[arg(long, env = "SUPPORT_BUNDLE_DESCRIPTION", default_value = "", help_heading = "Request Options")]
    pub description: String,

    /// External support bundle API; empty disables it
    #[arg(long, env = "SUPPORT_BUNDLE_EXTERNAL_API", default_value = constants::DEFAULT_EXTERNAL_API_URL, help_heading = "Source Options", value_hint = ValueHint::Url)]
    pub external_api: String,

    /// kubectl binary used for cluster data and logs
    #[arg(long, default_value = "kubectl", help_heading = "Source Options", value_hint = ValueHint::CommandName)]
    pub kubectl: PathBuf,

    /// HTTP server host
    #[arg(long, default_value = constants::DEFAULT_HOST, help_heading = "Server Options")]
    pub host: String,

    /// HTTP server port
    #[arg(long, default_value_t = constants::DEFAULT_PORT, help_heading = "Server Options")]
    pub port: u16,

    /// Largest accepted node bundle in bytes
    #[arg(long, default_value_t = constants::DEFAULT_MAX_UPLOAD_BYTES, help_heading = "Server Options")]
    pub max_upload: usize,

    /// What to do after the outcome is recorded: forever, exit, or a duration
    #[arg(long, default_value = "forever", value_parser = parse_linger_for_clap, help_heading = "Server Options")]
    pub linger: LingerPolicy,
}

pub fn run(cmd: ManagerCommand, status_dir: PathBuf) -> Result<()> {
    // Create tokio runtime for async operations
    let rt = Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(run_manager(cmd, status_dir))
}

async fn run_manager(cmd: ManagerCommand, status_dir: PathBuf) -> Result<()> {
    let addr = format!("{}:{}", cmd.host, cmd.port);
    let listen: SocketAddr = addr.parse().context("Invalid address format")?;

    let mut builder = BundleRequest::builder()
        .namespace(&cmd.namespace)
        .name(&cmd.bundle_name)
        .node_count(cmd.node_count)
        .wait_timeout(cmd.wait)
        .issue(&cmd.issue_url, &cmd.description)
        .listen(listen)
        .max_upload_bytes(cmd.max_upload)
        .linger(cmd.linger);
    if let Some(dir) = &cmd.output_dir {
        builder = builder.output_dir(dir);
    }
    let request = builder.build();

    let kubectl = Arc::new(KubectlSource::new(&cmd.namespace).with_binary(&cmd.kubectl));
    let status = Arc::new(FileStatusStore::new(&status_dir));
    let mut collaborators = Collaborators::new(kubectl.clone(), kubectl, status);
    if !cmd.external_api.is_empty() {
        let external = RemoteBundleSource::new("longhorn", &cmd.external_api)
            .context("Failed to create external bundle client")?;
        collaborators = collaborators.with_external(Arc::new(external));
    }

    eprintln!("{} manager v{}", constants::BINARY_NAME, constants::VERSION);
    eprintln!("  Bundle: {}/{}", cmd.namespace, cmd.bundle_name);
    eprintln!("  Nodes: {} (wait {:?})", cmd.node_count, cmd.wait);
    eprintln!("  Status: {}", status_dir.display());
    eprintln!("  Listening: http://{}", addr);
    if cmd.external_api.is_empty() {
        eprintln!("  External bundle: disabled");
    } else {
        eprintln!("  External bundle: {}", cmd.external_api);
    }
    eprintln!();

    let mut report = Coordinator::new(request, collaborators).run().await?;
    match &report.archive {
        Some(archive) => eprintln!(
            "✓ Support bundle {} ready ({} bytes)",
            archive.name, archive.size
        ),
        None => eprintln!(
            "✗ Support bundle failed: {}",
            report.detail.as_deref().unwrap_or("unknown error")
        ),
    }
    if report.collection_errors > 0 {
        eprintln!(
            "  {} collection errors, see {}",
            report.collection_errors,
            constants::ERROR_LOG_FILE
        );
    }

    report.linger(cmd.linger).await?;

    if !report.is_success() {
        anyhow::bail!(
            "support bundle {} ended in state '{}'",
            cmd.bundle_name,
            report.state
        );
    }
    Ok(())
}
