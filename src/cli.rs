//! Interface de linha de comando do stageline baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, demo, config)
//! e flags globais (--profile, --config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use stageline::config::Profile;

/// stageline: fila de produção de pista única com etapas temporizadas.
#[derive(Debug, Parser)]
#[command(name = "stageline", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Perfil de tempos; sobrescreve o arquivo e `STAGELINE_PROFILE`.
    #[arg(long, global = true)]
    pub profile: Option<ProfileArg>,

    /// Caminho do arquivo de configuração (padrão: ./stageline.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Perfil aceito pela CLI, mapeado para [`Profile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProfileArg {
    /// Tempos de produção: tick de 1s, jitter de 15%.
    Production,
    /// Tempos de teste: tick de 100ms, jitter de 5%.
    Test,
}

impl From<ProfileArg> for Profile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Production => Profile::Production,
            ProfileArg::Test => Profile::Test,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Processa itens de demonstração até esvaziar a fila.
    Run {
        /// Quantidade de itens a enfileirar.
        #[arg(long, short = 'n', default_value_t = 3)]
        items: u32,

        /// URL de callback; sem ela as conclusões só são registradas no log.
        #[arg(long)]
        callback_url: Option<String>,
    },

    /// Acompanha um único item com barra de progresso.
    Demo {
        /// URL de callback; sem ela as conclusões só são registradas no log.
        #[arg(long)]
        callback_url: Option<String>,
    },

    /// Mostra a configuração efetiva.
    Config,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_run_subcommand() {
        let cli = Cli::parse_from(["stageline", "run", "-n", "5"]);
        match cli.command {
            Command::Run {
                items,
                callback_url,
            } => {
                assert_eq!(items, 5);
                assert!(callback_url.is_none());
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn run_defaults_to_three_items() {
        let cli = Cli::parse_from(["stageline", "run"]);
        assert!(matches!(cli.command, Command::Run { items: 3, .. }));
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "stageline",
            "--profile",
            "test",
            "--config",
            "/tmp/custom.toml",
            "--verbose",
            "demo",
            "--callback-url",
            "http://localhost:3333/done",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.profile, Some(ProfileArg::Test));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/custom.toml")));
        match cli.command {
            Command::Demo { callback_url } => {
                assert_eq!(callback_url.as_deref(), Some("http://localhost:3333/done"));
            }
            _ => panic!("expected Demo command"),
        }
    }

    #[test]
    fn profile_arg_maps_to_profile() {
        assert_eq!(Profile::from(ProfileArg::Test), Profile::Test);
        assert_eq!(Profile::from(ProfileArg::Production), Profile::Production);
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
