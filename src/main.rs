use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use minild::prelude::*;

/// Diagnostics front-end for the minild engine: inspect an ELF64 shared
/// object's layout, or load it for real and optionally call into it.
#[derive(Parser)]
#[command(name = "minild", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the section layout of an ELF64 object without mapping it live.
    Inspect {
        path: PathBuf,
    },
    /// Map an ELF64 shared object, relocate it, run its constructors, and
    /// optionally call an exported symbol before tearing it down.
    Load {
        path: PathBuf,
        /// Name of a no-argument, no-return exported symbol to call after
        /// loading.
        #[arg(long)]
        call: Option<String>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("MINILD_LOG", "info"))
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("minild: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Inspect { path } => inspect(&path),
        Command::Load { path, call } => load(&path, call.as_deref()),
    }
}

fn inspect(path: &Path) -> Result<()> {
    let file = minild::elf::ImageFile::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let header = file.header();
    println!("{}", path.display());
    println!("  e_type:    {}", header.e_type);
    println!("  e_machine: {}", header.e_machine);
    println!("  e_entry:   {:#x}", header.e_entry);
    println!("  e_phnum:   {}", header.e_phnum);
    println!("  e_shnum:   {}", header.e_shnum);

    for phdr in file.program_headers()? {
        println!(
            "  phdr type={:#x} flags={:#x} vaddr={:#010x} filesz={:#x} memsz={:#x}",
            phdr.p_type, phdr.p_flags, phdr.p_vaddr, phdr.p_filesz, phdr.p_memsz
        );
    }

    for section in file.section_summaries()? {
        println!(
            "  section {:<20} addr={:#010x} size={:#x}",
            section.name, section.address, section.size
        );
    }
    Ok(())
}

fn load(path: &Path, call: Option<&str>) -> Result<()> {
    let handle = minild::open(path).with_context(|| format!("loading {}", path.display()))?;
    info!("loaded {} as handle {handle:#x}", path.display());

    if let Some(symbol) = call {
        let addr = minild::lookup(handle, symbol)
            .with_context(|| format!("looking up {symbol:?}"))?;
        println!("{symbol} resolved to {addr:#x}");
        unsafe {
            let f: unsafe extern "C" fn() = std::mem::transmute(addr as usize);
            f();
        }
    }

    minild::close(handle).context("closing image")?;
    Ok(())
}
