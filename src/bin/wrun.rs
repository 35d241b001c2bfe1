use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wrun::{InvocationBridge, ModuleLoader, ModuleSource, StdoutSink, Ty, Val};

#[derive(Parser)]
#[command(name = "wrun", about = "WebAssembly module host")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a module, invoke one export, and print the report line.
    Run {
        /// Path or http(s) URL of a .wasm module.
        source: String,
        /// Exported function to invoke.
        #[arg(long, default_value = "add")]
        export: String,
        /// Arguments, parsed against the export's declared parameter types.
        args: Vec<String>,
    },
    /// List a module's exported functions and their signatures.
    Exports {
        /// Path or http(s) URL of a .wasm module.
        source: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "wrun=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            source,
            export,
            args,
        } => run(&source, &export, &args),
        Command::Exports { source } => exports(&source),
    }
}

fn run(source: &str, export: &str, raw_args: &[String]) -> anyhow::Result<()> {
    let loader = ModuleLoader::default();
    let instance = loader.load(&ModuleSource::parse(source))?;

    let (params, _) = instance.export_types(export)?;
    let params: Vec<Ty> = params.to_vec();
    let args = parse_args(export, &params, raw_args)?;

    let mut bridge = InvocationBridge::new(instance);
    bridge.run_report(&mut StdoutSink, export, &args)?;
    Ok(())
}

fn exports(source: &str) -> anyhow::Result<()> {
    let loader = ModuleLoader::default();
    let instance = loader.load(&ModuleSource::parse(source))?;

    for (name, params, results) in instance.module().exports() {
        let params = render(params);
        let results = render(results);
        println!("{name}: ({params}) -> ({results})");
    }
    Ok(())
}

fn render(tys: &[Ty]) -> String {
    tys.iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse command-line argument strings against the declared parameter
/// types, so mismatches fail before any module code runs.
fn parse_args(export: &str, params: &[Ty], raw: &[String]) -> anyhow::Result<Vec<Val>> {
    anyhow::ensure!(
        raw.len() == params.len(),
        "`{export}` expects {} argument(s), got {}",
        params.len(),
        raw.len()
    );
    params
        .iter()
        .zip(raw)
        .map(|(ty, s)| {
            let val = match ty {
                Ty::I32 => Val::I32(s.parse()?),
                Ty::I64 => Val::I64(s.parse()?),
                Ty::F32 => Val::F32(s.parse()?),
                Ty::F64 => Val::F64(s.parse()?),
            };
            Ok(val)
        })
        .collect()
}
