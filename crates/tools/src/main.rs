use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tools::{
    CONFIG_ENV, ToolError, WindowArgs, load_config, manifest_ids, read_file, thumbnail,
    window_json, write_file,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Panorama gallery utilities")]
struct Args {
    /// Gallery config JSON
    #[arg(long, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the virtual-scroll window for a scroll position as JSON
    Window {
        #[arg(long)]
        scroll_top: f64,

        #[arg(long)]
        container_height: f64,

        /// Defaults to the config's item_height_px
        #[arg(long)]
        item_height: Option<f64>,

        /// Defaults to the config's buffer_size
        #[arg(long)]
        buffer: Option<usize>,

        #[arg(long)]
        total: usize,
    },

    /// Shrink an image into a snapshot JPEG
    Thumbnail {
        input: PathBuf,
        output: PathBuf,

        #[arg(long)]
        max_width: Option<u32>,

        #[arg(long)]
        max_height: Option<u32>,

        #[arg(long)]
        quality: Option<u8>,
    },

    /// Validate a gallery manifest and print one container id per item
    Manifest { file: PathBuf },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), ToolError> {
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Window {
            scroll_top,
            container_height,
            item_height,
            buffer,
            total,
        } => {
            let json = window_json(&WindowArgs {
                scroll_top,
                container_height,
                item_height: item_height.unwrap_or(config.item_height_px),
                buffer: buffer.unwrap_or(config.buffer_size),
                total,
            })?;
            println!("{json}");
        }
        Command::Thumbnail {
            input,
            output,
            max_width,
            max_height,
            quality,
        } => {
            let bytes = read_file(&input)?;
            let snap = thumbnail(
                &bytes,
                max_width.unwrap_or(config.thumbnail_max_width),
                max_height.unwrap_or(config.thumbnail_max_height),
                quality.unwrap_or(config.thumbnail_quality),
                config.capture_quality,
            )?;
            write_file(&output, &snap.jpeg)?;
            info!(
                input = %input.display(),
                output = %output.display(),
                width = snap.width,
                height = snap.height,
                bytes_in = bytes.len(),
                bytes_out = snap.jpeg.len(),
                "thumbnail written"
            );
        }
        Command::Manifest { file } => {
            let bytes = read_file(&file)?;
            let ids = manifest_ids(&String::from_utf8_lossy(&bytes))?;
            for id in &ids {
                println!("{id}");
            }
            info!(items = ids.len(), "manifest ok");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{Args, Command};
    use clap::{CommandFactory, Parser};
    use std::ffi::OsStr;
    use std::path::PathBuf;
    use tools::CONFIG_ENV;

    #[test]
    fn window_flags_parse_with_optional_overrides() {
        let args = Args::try_parse_from([
            "panogallery",
            "window",
            "--scroll-top",
            "0",
            "--container-height",
            "800",
            "--total",
            "16",
            "--buffer",
            "8",
        ])
        .expect("parse");
        match args.command {
            Command::Window {
                scroll_top,
                container_height,
                item_height,
                buffer,
                total,
            } => {
                assert_eq!(scroll_top, 0.0);
                assert_eq!(container_height, 800.0);
                assert_eq!(item_height, None);
                assert_eq!(buffer, Some(8));
                assert_eq!(total, 16);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_config_flag_precedes_subcommand() {
        let args = Args::try_parse_from([
            "panogallery",
            "--config",
            "gallery.json",
            "manifest",
            "items.json",
        ])
        .expect("parse");
        assert_eq!(args.config, Some(PathBuf::from("gallery.json")));
        assert!(matches!(args.command, Command::Manifest { .. }));
    }

    #[test]
    fn config_flag_reads_its_environment_variable() {
        let command = Args::command();
        let config = command
            .get_arguments()
            .find(|arg| arg.get_id() == "config")
            .expect("config argument");
        assert_eq!(config.get_env(), Some(OsStr::new(CONFIG_ENV)));
        assert_eq!(CONFIG_ENV, "PANOGALLERY_CONFIG");
    }

    #[test]
    fn window_requires_total() {
        let res = Args::try_parse_from([
            "panogallery",
            "window",
            "--scroll-top",
            "0",
            "--container-height",
            "800",
        ]);
        assert!(res.is_err());
    }
}
