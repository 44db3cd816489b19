//! `mkfs.microfs`: formats a device or image file as a microfs volume.
//!
//! Grounded on `mkfs/src/main.rs`'s argument-parsing and exit-on-error
//! style.

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::exit;

use microfs::device::{BlockDevice, FileBlockDevice};
use microfs::format::{format, is_formatted};
use microfs::layout::FS_BLOCK_SIZE;

/// Shows `text` and reads a line of input. Returns `true` if it starts
/// with `y`/`Y`.
///
/// Grounded on `mkfs/src/main.rs`'s use of `utils::prompt::prompt` for its
/// "proceed anyway?" confirmation; reduced to the non-hidden case, which is
/// the only one this binary needs.
fn confirm(text: &str) -> bool {
	print!("{text}");
	let _ = io::stdout().flush();
	let mut line = String::new();
	if io::stdin().lock().read_line(&mut line).is_err() {
		return false;
	}
	line.trim().eq_ignore_ascii_case("y")
}

#[derive(Default)]
struct Args {
	prog: String,
	help: bool,
	ignore_case: bool,
	fold_case: bool,
	/// Block count to use when creating a plain-file image rather than
	/// formatting an existing block device.
	create_blocks: Option<usize>,
	device_path: Option<PathBuf>,
}

fn parse_args() -> Args {
	let mut args = Args::default();
	let mut iter = env::args();
	args.prog = iter.next().unwrap_or_else(|| "mkfs.microfs".to_owned());

	while let Some(arg) = iter.next() {
		match arg.as_str() {
			"-h" | "--help" => args.help = true,
			"-i" | "--ignore-case" => args.ignore_case = true,
			"-f" | "--fold-case" => args.fold_case = true,
			"-c" | "--create" => {
				let blocks = iter.next().unwrap_or_else(|| {
					eprintln!("{}: --create requires a block count", args.prog);
					exit(1);
				});
				args.create_blocks = Some(blocks.parse().unwrap_or_else(|_| {
					eprintln!("{}: invalid block count `{blocks}`", args.prog);
					exit(1);
				}));
			}
			_ => args.device_path = Some(PathBuf::from(arg)),
		}
	}

	args
}

fn usage(prog: &str) {
	println!("Usage: {prog} [-i] [-f] [-c BLOCKS] DEVICE");
	println!("  -i, --ignore-case   case-insensitive directory lookup");
	println!("  -f, --fold-case     upper-case stored names (implies -i)");
	println!("  -c, --create N      create a new N-block image file instead of");
	println!("                      formatting an existing device");
}

fn main() {
	let args = parse_args();
	if args.help {
		usage(&args.prog);
		return;
	}

	let device_path = args.device_path.unwrap_or_else(|| {
		eprintln!("{}: specify path to a device", args.prog);
		exit(1);
	});

	let mut dev = match args.create_blocks {
		Some(nblks) => FileBlockDevice::create(&device_path, nblks),
		None => FileBlockDevice::open(&device_path),
	}
	.unwrap_or_else(|e| {
		eprintln!("{}: {}: {}", args.prog, device_path.display(), e);
		exit(1);
	});

	if args.create_blocks.is_none() {
		let already_formatted = is_formatted(&mut dev).unwrap_or_else(|e| {
			eprintln!("{}: {}: {}", args.prog, device_path.display(), e);
			exit(1);
		});
		if already_formatted {
			println!("{} already contains a microfs volume", device_path.display());
			if !confirm("Proceed anyway? (y/N) ") {
				eprintln!("Abort.");
				exit(1);
			}
		}
	}

	format(&mut dev, args.ignore_case, args.fold_case).unwrap_or_else(|e| {
		eprintln!("{}: failed to format volume: {}", args.prog, e);
		exit(1);
	});

	println!(
		"{}: formatted {} ({} blocks, {} bytes/block)",
		args.prog,
		device_path.display(),
		dev.num_blocks(),
		FS_BLOCK_SIZE,
	);
}
