//! DCP CLI Tool
//!
//! Command-line interface for creating, inspecting, comparing and verifying
//! Digital Cinema Packages.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use dcp_core::{
    ContentKind, Cpl, Dcp, EqualityOptions, EssencePolicy, FileCodec, Fraction, NoteCollector,
    NoteType, PictureMode, Reel, Size, XmlMetadata,
};
use dcp_reader::AssetReader;
use dcp_writer::{AssetWriter, WriterConfig};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dcp")]
#[command(about = "Create, inspect, compare and verify Digital Cinema Packages")]
#[command(version)]
struct Cli {
    /// Log more (-v for debug output)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the compositions of a package
    Info {
        /// Package directory
        dcp: PathBuf,

        /// Leave out assets whose essence is missing instead of failing
        #[arg(long)]
        permissive: bool,
    },

    /// Compare two packages structurally
    Diff {
        /// First package directory
        a: PathBuf,

        /// Second package directory
        b: PathBuf,

        /// CPL names may differ
        #[arg(long)]
        cpl_names_can_differ: bool,

        /// Essence file names may differ
        #[arg(long)]
        mxf_names_can_differ: bool,

        /// Essence digests may differ (skips hashing)
        #[arg(long)]
        digests_can_differ: bool,

        /// Encryption key ids may differ
        #[arg(long)]
        key_ids_can_differ: bool,

        /// JSON file with equality options; flags are added on top
        #[arg(long)]
        options: Option<PathBuf>,

        /// Leave out assets whose essence is missing instead of failing
        #[arg(long)]
        permissive: bool,

        /// Print the notes as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check every file of a package against its packing list
    Verify {
        /// Package directory
        dcp: PathBuf,

        /// Also check each frame against its frame index
        #[arg(long)]
        frames: bool,
    },

    /// Build a 2D package from a directory of picture frames
    Create {
        /// Directory of frame files, used in file name order
        frames: PathBuf,

        /// Output package directory
        #[arg(short, long)]
        output: PathBuf,

        /// Composition name
        #[arg(long, default_value = "Untitled")]
        name: String,

        /// Frames per second
        #[arg(long, default_value = "24")]
        fps: u32,

        /// Content kind (feature, short, trailer, test, ...)
        #[arg(long, default_value = "feature", value_parser = parse_content_kind)]
        kind: ContentKind,

        /// Picture width in pixels
        #[arg(long, default_value = "1998")]
        width: u32,

        /// Picture height in pixels
        #[arg(long, default_value = "1080")]
        height: u32,

        /// Issuer written into the manifests
        #[arg(long, default_value = "dcp")]
        issuer: String,

        /// Replace existing essence files
        #[arg(long)]
        overwrite: bool,
    },
}

fn parse_content_kind(s: &str) -> std::result::Result<ContentKind, String> {
    s.parse().map_err(|e: dcp_core::Error| e.to_string())
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ok = match cli.command {
        Commands::Info { dcp, permissive } => show_info(&dcp, policy(permissive))?,

        Commands::Diff {
            a,
            b,
            cpl_names_can_differ,
            mxf_names_can_differ,
            digests_can_differ,
            key_ids_can_differ,
            options,
            permissive,
            json,
        } => {
            let mut opt = match options {
                Some(path) => load_options(&path)?,
                None => EqualityOptions::default(),
            };
            opt.cpl_names_can_differ |= cpl_names_can_differ;
            opt.mxf_names_can_differ |= mxf_names_can_differ;
            opt.digests_can_differ |= digests_can_differ;
            opt.key_ids_can_differ |= key_ids_can_differ;
            diff_dcps(&a, &b, &opt, policy(permissive), json)?
        }

        Commands::Verify { dcp, frames } => verify_dcp(&dcp, frames)?,

        Commands::Create {
            frames,
            output,
            name,
            fps,
            kind,
            width,
            height,
            issuer,
            overwrite,
        } => {
            let settings = CreateSettings {
                name,
                fps,
                kind,
                size: Size::new(width, height),
                issuer,
                overwrite,
            };
            create_dcp(&frames, &output, &settings)?
        }
    };

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn init_logging(verbose: u8) {
    let default_level = if verbose > 0 { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn policy(permissive: bool) -> EssencePolicy {
    if permissive {
        EssencePolicy::Permissive
    } else {
        EssencePolicy::Strict
    }
}

fn load_options(path: &Path) -> Result<EqualityOptions> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read options file {}", path.display()))?;
    EqualityOptions::from_json(&text)
        .with_context(|| format!("Invalid options file {}", path.display()))
}

fn read_dcp(dir: &Path, policy: EssencePolicy) -> Result<Dcp> {
    Dcp::read(dir, &FileCodec, policy)
        .with_context(|| format!("Failed to read DCP in {}", dir.display()))
}

fn show_info(dir: &Path, policy: EssencePolicy) -> Result<bool> {
    let dcp = read_dcp(dir, policy)?;
    println!("DCP: {}", dir.display());
    println!("  CPLs: {}", dcp.cpls().len());

    for cpl in dcp.cpls() {
        println!();
        println!("CPL {} \"{}\"", cpl.uuid(), cpl.name());
        println!("  Kind:   {}", cpl.content_kind());
        println!("  FPS:    {}", cpl.fps());
        println!(
            "  Length: {} frames ({:.1}s)",
            cpl.length(),
            cpl.length() as f64 / f64::from(cpl.fps().max(1))
        );

        for (i, reel) in cpl.reels().iter().enumerate() {
            println!("  Reel {} ({})", i + 1, reel.uuid());
            for asset in reel.assets() {
                let mode = match asset.picture_mode() {
                    Some(PictureMode::Stereo) => " 3D",
                    _ => "",
                };
                let encrypted = if asset.encrypted() { " encrypted" } else { "" };
                println!(
                    "    {}{}: {} [{}..{}) of {}{}",
                    asset.kind(),
                    mode,
                    asset.file_name(),
                    asset.entry_point(),
                    asset.entry_point() + asset.duration(),
                    asset.intrinsic_duration(),
                    encrypted
                );
            }
        }
    }

    Ok(true)
}

fn diff_dcps(
    a: &Path,
    b: &Path,
    opt: &EqualityOptions,
    policy: EssencePolicy,
    json: bool,
) -> Result<bool> {
    let first = read_dcp(a, policy)?;
    let second = read_dcp(b, policy)?;

    let equal = if json {
        let mut collector = NoteCollector::new();
        let equal = first.equals(&second, opt, &mut collector.sink());
        println!("{}", serde_json::to_string_pretty(&collector.notes)?);
        equal
    } else {
        let mut print = |severity: NoteType, message: String| println!("{severity}: {message}");
        let equal = first.equals(&second, opt, &mut print);
        if equal {
            println!("DCPs are equal");
        } else {
            println!("DCPs differ");
        }
        equal
    };

    Ok(equal)
}

fn verify_dcp(dir: &Path, frames: bool) -> Result<bool> {
    let dcp = read_dcp(dir, EssencePolicy::Strict)?;

    let mut errors = 0usize;
    let mut print = |severity: NoteType, message: String| {
        if severity == NoteType::Error {
            errors += 1;
        }
        println!("{severity}: {message}");
    };
    let mut ok = dcp.verify(&mut print)?;

    if frames {
        let mut seen = HashSet::new();
        for asset in dcp.cpls().iter().flat_map(Cpl::assets) {
            if !seen.insert(asset.uuid()) {
                continue;
            }
            if !verify_frames(&asset, &mut print)? {
                ok = false;
            }
        }
    }

    if ok {
        println!("{}: OK", dir.display());
    } else {
        println!("{}: {} error(s)", dir.display(), errors);
    }
    Ok(ok)
}

fn verify_frames(
    asset: &Arc<dcp_core::Asset>,
    note: &mut dyn FnMut(NoteType, String),
) -> Result<bool> {
    if asset.encrypted() {
        note(
            NoteType::Warning,
            format!("{}: encrypted, frames not checked", asset.file_name()),
        );
        return Ok(true);
    }

    let mut reader = AssetReader::open(Arc::clone(asset), &FileCodec)
        .with_context(|| format!("Failed to open {}", asset.file_name()))?;
    if !reader.has_index() {
        note(
            NoteType::Warning,
            format!("{}: no frame index, frames not checked", asset.file_name()),
        );
        return Ok(true);
    }

    let mut ok = true;
    for n in 0..asset.duration() {
        if !reader.verify_frame(n)? {
            note(
                NoteType::Error,
                format!("{}: frame {} does not match its index", asset.file_name(), n),
            );
            ok = false;
        }
    }
    Ok(ok)
}

struct CreateSettings {
    name: String,
    fps: u32,
    kind: ContentKind,
    size: Size,
    issuer: String,
    overwrite: bool,
}

fn create_dcp(frames_dir: &Path, output: &Path, settings: &CreateSettings) -> Result<bool> {
    let mut frames = std::fs::read_dir(frames_dir)
        .with_context(|| format!("Failed to read {}", frames_dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    frames.retain(|p| p.is_file());
    frames.sort();
    if frames.is_empty() {
        bail!("No frame files in {}", frames_dir.display());
    }
    tracing::debug!(count = frames.len(), "collected frame files");

    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    println!(
        "Creating DCP \"{}\" from {} frames in {}",
        settings.name,
        frames.len(),
        frames_dir.display()
    );

    let config = WriterConfig {
        overwrite: settings.overwrite,
        ..WriterConfig::default()
    };
    let mut writer = AssetWriter::picture(
        output,
        "video.mxf",
        Fraction::new(settings.fps, 1),
        settings.size,
        PictureMode::Mono,
    )
    .with_config(config);

    for path in &frames {
        let data =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        writer
            .write(&data)
            .with_context(|| format!("Failed to write frame {}", path.display()))?;
    }
    let picture = writer.finalize().context("Failed to finalize picture")?;

    let mut cpl = Cpl::new(
        output,
        settings.name.as_str(),
        settings.kind,
        frames.len() as u64,
        settings.fps,
    );
    cpl.add_reel(Reel::new(Some(Arc::new(picture)), None, None)?);

    let mut dcp = Dcp::new(output);
    dcp.add_cpl(cpl);
    let metadata = XmlMetadata::now(
        settings.issuer.as_str(),
        format!("dcp {}", env!("CARGO_PKG_VERSION")),
    );
    let asset_map = dcp.write_xml(&metadata).context("Failed to write DCP")?;

    println!("Wrote {}", asset_map.display());
    Ok(true)
}
