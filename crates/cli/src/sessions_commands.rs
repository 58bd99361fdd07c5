use {
    anyhow::Result,
    clap::Subcommand,
    wagate_sessions::{SessionMetadata, SessionRecord},
};

#[derive(Subcommand)]
pub enum SessionAction {
    /// List sessions the gateway resumes on its next boot.
    List,
}

pub fn handle_sessions(action: SessionAction) -> Result<()> {
    match action {
        SessionAction::List => list(),
    }
}

fn list() -> Result<()> {
    let config = wagate_config::discover_and_load();
    let metadata = SessionMetadata::load(config.sessions.metadata_path())?;
    let records = metadata.list();
    if records.is_empty() {
        println!("No persisted sessions in {}", metadata.path().display());
        return Ok(());
    }
    print!("{}", format_table(&records));
    Ok(())
}

fn format_table(records: &[SessionRecord]) -> String {
    let width = records
        .iter()
        .map(|r| r.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    let mut out = format!("{:<width$}  WEBHOOK\n", "NAME");
    for record in records {
        out.push_str(&format!(
            "{:<width$}  {}\n",
            record.name,
            record.webhook_url.as_deref().unwrap_or("-")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_aligns_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut metadata = SessionMetadata::load(dir.path().join("sessions.json")).unwrap();
        metadata.upsert("alice", Some("http://hooks.local/a".into()));
        metadata.upsert("bo", None);

        let mut records = metadata.list();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            format_table(&records),
            "NAME   WEBHOOK\nalice  http://hooks.local/a\nbo     -\n"
        );
    }
}
