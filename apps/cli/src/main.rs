use std::io::Write;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{error, info};

use kvs_core::config::ScanConfig;
use kvs_core::protocol::window::{PAGES_CONTINUOUS, WindowDescriptor};
use kvs_core::session::{ScanSession, SessionState, Side};
use kvs_core::transport::ScsiTransport;
use kvs_core::transport::usb::UsbTransport;

#[derive(Parser, Debug)]
#[command(author, version, about = "Panasonic KV-series document scanner tool", long_about = None)]
struct Args {
    /// Output file base; pages land in <base>-<nnn>-<A|B>.jpeg
    filebase: Option<String>,

    /// Device to use: "<bus>:<device>" for USB, a /dev/sg* path with --sg
    #[arg(short, long)]
    device: Option<String>,

    /// Drive the scanner through the kernel SCSI-generic passthrough
    #[arg(long)]
    sg: bool,

    /// Number of pages to scan
    #[arg(short = 'n', long, default_value_t = 1)]
    pages: u32,

    /// First page number used in output file names
    #[arg(short = 'p', long, default_value_t = 0)]
    first_page: u32,

    /// JPEG quality, 1-100
    #[arg(short, long)]
    quality: Option<u8>,

    /// Pages scanned per SET WINDOW/SCAN cycle
    #[arg(short, long)]
    block_size: Option<u32>,

    /// Paper width in inches
    #[arg(short, long)]
    width: Option<f64>,

    /// Paper height in inches
    #[arg(long)]
    height: Option<f64>,

    /// Compression code (129 = 0x81 = JPEG, 0 = none)
    #[arg(short, long)]
    compression: Option<u8>,

    /// Resolution in dpi
    #[arg(short, long)]
    resolution: Option<u16>,

    /// Scan from the flatbed
    #[arg(short, long)]
    flatbed: bool,

    /// Scan front and back of each page
    #[arg(long)]
    duplex: bool,

    /// Write image data to stdout instead of files
    #[arg(short = 's', long)]
    stdout: bool,

    /// Load scan settings from a TOML file (flags override it)
    #[arg(long)]
    config: Option<String>,

    /// List attached USB scanners
    #[arg(long)]
    list: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(&args) {
        error!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    if args.list {
        let addresses = UsbTransport::list_addresses()?;
        if addresses.is_empty() {
            println!("No devices found");
        }
        for address in addresses {
            println!("{address}");
        }
        return Ok(());
    }

    if args.filebase.is_none() && !args.stdout {
        bail!("an output file base is required unless --stdout is given");
    }

    let (window, duplex) = build_window(args)?;

    if args.sg {
        #[cfg(target_os = "linux")]
        {
            use kvs_core::transport::sg::SgTransport;
            let transport = match &args.device {
                Some(path) => SgTransport::open_path(path)?,
                None => SgTransport::open()?,
            };
            return scan(transport, window, duplex, args);
        }
        #[cfg(not(target_os = "linux"))]
        bail!("--sg needs the linux SCSI-generic driver");
    }

    let transport = UsbTransport::open(args.device.as_deref())?;
    scan(transport, window, duplex, args)
}

fn build_window(args: &Args) -> Result<(WindowDescriptor, bool)> {
    let mut config = match &args.config {
        Some(path) => {
            ScanConfig::load_from_file(path).with_context(|| format!("loading {path}"))?
        }
        None => ScanConfig::default(),
    };

    // Flags win over the config file.
    config.resolution = args.resolution.or(config.resolution);
    config.paper_width = args.width.or(config.paper_width);
    config.paper_height = args.height.or(config.paper_height);
    config.quality = args.quality.or(config.quality);
    config.compression = args.compression.or(config.compression);
    if args.flatbed {
        config.flatbed = Some(true);
    }

    let mut window = if args.sg {
        WindowDescriptor::sg_defaults()
    } else {
        WindowDescriptor::usb_defaults()
    };
    config.apply(&mut window)?;

    // Oversized blocks collapse into one cycle covering the whole run.
    let block_size = args
        .block_size
        .or(config.block_size.map(u32::from))
        .unwrap_or(1);
    window.pages_to_scan = if block_size > 254 {
        if args.pages > 254 {
            PAGES_CONTINUOUS
        } else {
            args.pages as u8
        }
    } else {
        block_size as u8
    };

    let duplex = args.duplex || config.duplex.unwrap_or(false);
    Ok((window, duplex))
}

fn scan<T: ScsiTransport>(
    transport: T,
    window: WindowDescriptor,
    duplex: bool,
    args: &Args,
) -> Result<()> {
    let mut session = ScanSession::new(transport, window, duplex);
    let mut pages_done = 0u32;

    'blocks: while pages_done < args.pages {
        session.set_windows()?;
        match session.start_scan() {
            Ok(()) => {}
            Err(e) if e.is_end_of_document() => {
                info!("No more paper");
                break;
            }
            Err(e) => return Err(e.into()),
        }

        while session.state() == SessionState::Scanning {
            let image = match session.read_side() {
                Ok(image) => image,
                Err(e) if e.is_end_of_document() => {
                    info!("End of document");
                    break 'blocks;
                }
                Err(e) => return Err(e.into()),
            };

            write_image(args, args.first_page + image.page, image.side, &image.data)?;
            if image.side == Side::Back || !duplex {
                pages_done += 1;
            }
            if pages_done >= args.pages {
                break 'blocks;
            }
        }
    }

    info!(pages = pages_done, "Scan finished");
    session.close();
    Ok(())
}

fn write_image(args: &Args, page: u32, side: Side, data: &[u8]) -> Result<()> {
    if args.stdout {
        std::io::stdout().lock().write_all(data)?;
        return Ok(());
    }
    // Presence checked before scanning starts.
    let base = args.filebase.as_deref().unwrap_or("page");
    let name = format!("{base}-{page:03}-{}.jpeg", side.tag());
    std::fs::write(&name, data).with_context(|| format!("writing {name}"))?;
    info!(file = %name, bytes = data.len(), "Page written");
    Ok(())
}
