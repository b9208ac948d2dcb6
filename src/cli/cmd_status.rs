use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use supportbundle::FileStatusStore;
use supportbundle::status::StatusRecord;

#[derive(Args)]
#[command(
    about = "Show the state of a support bundle request",
    long_about = "Display the stored status record of a support bundle request: its state,
the error detail when it failed, and the archive name and size once it is
done. Use --json for machine-readable output.",
    alias = "info",
    help_template = crate::clap_help!(
        examples: "  # Show request status\n  \
                   {bin} status sb-1\n\n  \
                   # JSON output for scripting\n  \
                   {bin} status sb-1 --json"
    )
)]
pub struct StatusCommand {
    /// Name of the support bundle request
    pub name: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(cmd: StatusCommand, status_dir: PathBuf) -> Result<()> {
    let store = FileStatusStore::new(&status_dir);
    let record = store.load(&cmd.name)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_human_status(&record);
    }
    Ok(())
}

fn print_human_status(record: &StatusRecord) {
    let state = if record.state.as_str().is_empty() {
        "(none)"
    } else {
        record.state.as_str()
    };

    println!("Support bundle {}", record.name);
    println!("  Namespace: {}", record.namespace);
    println!("  State:     {}", state);
    if !record.error.is_empty() {
        println!("  Error:     {}", record.error);
    }
    if !record.filename.is_empty() {
        println!("  Archive:   {} ({} bytes)", record.filename, record.filesize);
    }
    if !record.issue_url.is_empty() {
        println!("  Issue:     {}", record.issue_url);
    }
    println!("  Updated:   {}", record.updated_at);
}
