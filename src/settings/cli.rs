use super::Parser;

#[derive(Parser, Debug)]
#[command(name = "vidtube", about = "Video sharing backend")]
pub struct Cli {
    /// Path to a settings TOML file
    #[arg(long)]
    pub settings: Option<String>,
}
