use {anyhow::Result, clap::Subcommand, wagate_config::WagateConfig};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the resolved configuration as TOML. Secrets are omitted.
    Show,
    /// Print the path of the config file in use.
    Path,
}

pub fn handle_config(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = wagate_config::discover_and_load();
            print!("{}", render(&config)?);
            Ok(())
        },
        ConfigAction::Path => {
            println!("{}", wagate_config::find_or_default_config_path().display());
            Ok(())
        },
    }
}

fn render(config: &WagateConfig) -> Result<String> {
    toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))
}

#[cfg(test)]
mod tests {
    use {super::*, wagate_config::load_config};

    #[test]
    fn render_round_trips_without_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wagate.toml");
        std::fs::write(
            &path,
            "[server]\nport = 4000\n\n[auth]\ntoken = \"hunter2\"\n\n[engine]\nkind = \"memory\"\n",
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        let rendered = render(&config).unwrap();
        assert!(rendered.contains("port = 4000"));
        assert!(rendered.contains("kind = \"memory\""));
        assert!(!rendered.contains("hunter2"));
    }
}
