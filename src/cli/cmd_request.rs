// Request command - create a support bundle request record
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use supportbundle::BundleState;
use supportbundle::FileStatusStore;
use supportbundle::status::StatusRecord;

#[derive(Args)]
#[command(
    about = "Create a support bundle request",
    long_about = "Create a status record for a new support bundle request in the 'generating'
state. A manager started with the same name and status directory picks it up.

An existing record with the same name is replaced.",
    help_template = crate::clap_help!(
        examples: "  # Create a request\n  \
                   {bin} request sb-1 --namespace harvester-system\n\n  \
                   # With issue metadata\n  \
                   {bin} request sb-1 --issue-url https://github.com/harvester/harvester/issues/1 \\\n      \
                   --description 'VM stuck in starting'"
    )
)]
pub struct RequestCommand {
    /// Name of the support bundle request
    pub name: String,

    /// Namespace of the support bundle request
    #[arg(long, env = "SUPPORT_BUNDLE_NAMESPACE", default_value = "harvester-system")]
    pub namespace: String,

    /// Issue URL
    #[arg(long, default_value = "")]
    pub issue_url: String,

    /// Issue description
    #[arg(long, default_value = "")]
    pub description: String,
}

pub fn run(cmd: RequestCommand, status_dir: PathBuf) -> Result<()> {
    let store = FileStatusStore::new(&status_dir);

    let mut record = StatusRecord::new(&cmd.name, &cmd.namespace);
    record.state = BundleState::Generating;
    record.issue_url = cmd.issue_url;
    record.description = cmd.description;
    store.create(&record)?;

    eprintln!("✓ Support bundle request {} created", cmd.name);
    eprintln!("  State: {}", record.state);
    eprintln!("  Record: {}", store.record_path(&cmd.name).display());
    Ok(())
}
