//! Print what MPlayer knows about media files, as JSON.

use std::path::PathBuf;
use std::process::ExitCode;

use mplayer_embed::mplayer::identify;
use mplayer_embed::PlayerConfig;

#[tokio::main]
async fn main() -> ExitCode {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let files: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
  if files.is_empty() {
    eprintln!("usage: mplayer-identify <file>...");
    return ExitCode::from(2);
  }

  let config = match PlayerConfig::default_path() {
    Some(path) => match PlayerConfig::load(&path) {
      Ok(config) => config,
      Err(e) => {
        log::error!("Failed to load {:?}: {}", path, e);
        return ExitCode::FAILURE;
      }
    },
    None => PlayerConfig::default(),
  };
  let mplayer_path = config.mplayer_path();

  let mut status = ExitCode::SUCCESS;
  for file in files {
    println!("identifying {}:", file.display());
    match identify(mplayer_path.as_deref(), &file).await {
      Ok(info) => match serde_json::to_string_pretty(&info) {
        Ok(json) => println!("{}", json),
        Err(e) => log::error!("Failed to serialize properties: {}", e),
      },
      Err(e) => {
        log::error!("Failed to identify {:?}: {}", file, e);
        status = ExitCode::FAILURE;
      }
    }
  }
  status
}
