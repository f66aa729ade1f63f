use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use clap::{ArgAction, Parser};
use color_eyre::eyre::{Result, WrapErr, bail, eyre};
use serde_json::Value;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use infowall::prelude::*;
use infowall::{
    DocumentFormat, OutputDestination, OutputOptions, Semantics, emit, parse_document_str,
};

#[derive(Debug, Parser)]
#[command(
    name = "infowall",
    version,
    about = "Keep the panels of an info wall document in step with its properties"
)]
struct Cli {
    /// Params document: file path, inline payload, or "-" for stdin
    #[arg(short = 'p', long = "params", value_name = "SPEC")]
    params: String,

    /// Field semantics replacing the built-in info wall layout
    #[arg(long = "semantics", value_name = "SPEC")]
    semantics: Option<String>,

    /// Synchronizer options (paths, delays, translations)
    #[arg(short = 'c', long = "config", value_name = "SPEC")]
    config: Option<String>,

    /// Edit applied after loading, in order: add-property=LABEL,
    /// remove-property=INDEX, move-property=FROM:TO, add-panel, remove-panel=INDEX
    #[arg(long = "op", value_name = "OP", action = ArgAction::Append)]
    ops: Vec<Op>,

    /// Output destinations ("-" writes to stdout). Defaults to stdout.
    #[arg(short = 'o', long = "output", value_name = "DEST", num_args = 1.., action = ArgAction::Append)]
    outputs: Vec<String>,

    /// Output format; inferred from the first output file when omitted
    #[arg(long = "format", value_name = "FMT")]
    format: Option<String>,

    /// Emit compact JSON/TOML rather than pretty formatting
    #[arg(long = "no-pretty")]
    no_pretty: bool,

    /// Fail when the synchronized document does not validate
    #[arg(long = "strict")]
    strict: bool,

    /// Log synchronizer activity to stderr
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    AddProperty(String),
    RemoveProperty(usize),
    MoveProperty { from: usize, to: usize },
    AddPanel,
    RemovePanel(usize),
}

impl FromStr for Op {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (name, arg) = match raw.split_once('=') {
            Some((name, arg)) => (name, Some(arg)),
            None => (raw, None),
        };
        match (name, arg) {
            ("add-property", Some(label)) => Ok(Op::AddProperty(label.to_string())),
            ("remove-property", Some(index)) => parse_index(index).map(Op::RemoveProperty),
            ("move-property", Some(range)) => {
                let (from, to) = range
                    .split_once(':')
                    .ok_or_else(|| format!("expected FROM:TO, got '{range}'"))?;
                Ok(Op::MoveProperty {
                    from: parse_index(from)?,
                    to: parse_index(to)?,
                })
            }
            ("add-panel", None) => Ok(Op::AddPanel),
            ("remove-panel", Some(index)) => parse_index(index).map(Op::RemovePanel),
            _ => Err(format!("unknown operation '{raw}'")),
        }
    }
}

fn parse_index(raw: &str) -> Result<usize, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("'{raw}' is not an index"))
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let stdin_specs = [Some(cli.params.as_str()), cli.semantics.as_deref(), cli.config.as_deref()]
        .into_iter()
        .filter(|spec| *spec == Some("-"))
        .count();
    if stdin_specs > 1 {
        bail!("only one of --params, --semantics and --config can read from stdin");
    }

    let params = load_value(&cli.params, "params")?;
    let semantics = match cli.semantics.as_deref() {
        Some(spec) => Semantics::from_value(load_value(spec, "semantics")?)
            .wrap_err("invalid field semantics")?,
        None => Semantics::info_wall(),
    };
    let options = match cli.config.as_deref() {
        Some(spec) => {
            SyncOptions::from_value(load_value(spec, "config")?).wrap_err("invalid config")?
        }
        None => SyncOptions::default(),
    };
    let output = build_output_options(&cli)?;

    let mut tree = FieldTree::from_params(semantics, &params);
    tree.attach_metadata_forms();

    let mut now = Instant::now();
    let root = tree.root();
    let mut sync = Synchronizer::builder(options).attach(&mut tree, root, now)?;
    for op in &cli.ops {
        now = apply(op, &mut tree, &mut sync, now)?;
    }

    if let Err(issues) = sync.validate(&tree) {
        for issue in &issues {
            eprintln!("validation: {issue}");
        }
        if cli.strict {
            bail!("document failed validation with {} issue(s)", issues.len());
        }
    }

    emit(&tree.to_value(), &output).map_err(|err| eyre!("{err:#}"))?;
    Ok(())
}

fn init_logging(verbose: u8) {
    let default = if verbose > 0 { "infowall=debug,warn" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(false)
                .with_target(true),
        )
        .init();
}

/// Apply one edit the way a user would and let the synchronizer catch up.
fn apply(op: &Op, tree: &mut FieldTree, sync: &mut Synchronizer, now: Instant) -> Result<Instant> {
    tracing::debug!(?op, "applying edit");
    let mut now = now;
    match op {
        Op::AddProperty(label) => {
            let property = tree.add_item(sync.properties())?;
            let field = locate(&*tree, sync.options().paths.property_label.as_str(), property)
                .ok_or_else(|| eyre!("properties have no label field"))?;
            tree.edit_text(field, label.as_str())?;
        }
        Op::RemoveProperty(index) => {
            tree.remove_item(sync.properties(), *index)
                .wrap_err("cannot remove property")?;
        }
        Op::MoveProperty { from, to } => {
            tree.move_item(sync.properties(), *from, *to)
                .wrap_err("cannot move property")?;
            sync.pointer_released(now);
            now += sync.options().reorder_delay();
        }
        Op::AddPanel => {
            tree.add_item(sync.panels())?;
            tree.attach_metadata_forms();
        }
        Op::RemovePanel(index) => {
            tree.remove_item(sync.panels(), *index)
                .wrap_err("cannot remove panel")?;
        }
    }
    sync.pump(tree, now)?;
    Ok(now)
}

fn load_value(spec: &str, label: &str) -> Result<Value> {
    if spec == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .wrap_err("failed to read from stdin")?;
        return parse_contents(&buffer, DocumentFormat::default(), label);
    }

    let path = PathBuf::from(spec);
    if !path.is_file() {
        return parse_contents(spec, DocumentFormat::default(), &format!("inline {label}"));
    }
    let format = DocumentFormat::from_extension(&path).unwrap_or_default();
    let contents = fs::read_to_string(&path)
        .wrap_err_with(|| format!("failed to load {label} from {}", path.display()))?;
    parse_contents(&contents, format, label)
}

fn parse_contents(contents: &str, format: DocumentFormat, label: &str) -> Result<Value> {
    match parse_document_str(contents, format) {
        Ok(value) => Ok(value),
        Err(primary) => DocumentFormat::available_formats()
            .into_iter()
            .filter(|candidate| *candidate != format)
            .find_map(|candidate| parse_document_str(contents, candidate).ok())
            .ok_or_else(|| {
                eyre!(
                    "failed to parse {label}: tried {} (first error: {primary:#})",
                    format_list()
                )
            }),
    }
}

fn format_list() -> String {
    DocumentFormat::available_formats()
        .into_iter()
        .map(|format| format.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn build_output_options(cli: &Cli) -> Result<OutputOptions> {
    let mut destinations = Vec::new();
    for raw in &cli.outputs {
        if raw.trim().is_empty() {
            bail!("output destination cannot be empty");
        }
        destinations.push(OutputDestination::parse(raw));
    }
    if destinations.is_empty() {
        destinations.push(OutputDestination::Stdout);
    }

    let format = match cli.format.as_deref() {
        Some(name) => DocumentFormat::from_name(&name.to_ascii_lowercase())
            .ok_or_else(|| eyre!("unsupported output format '{name}'; use {}", format_list()))?,
        None => destinations
            .iter()
            .find_map(|destination| match destination {
                OutputDestination::File(path) => Some(path.as_path()),
                OutputDestination::Stdout => None,
            })
            .and_then(DocumentFormat::from_extension)
            .unwrap_or_default(),
    };

    Ok(OutputOptions::new(format)
        .with_pretty(!cli.no_pretty)
        .with_destinations(destinations))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn parses_operations() {
        assert_eq!(
            "add-property=Name".parse::<Op>(),
            Ok(Op::AddProperty("Name".to_string()))
        );
        assert_eq!("remove-property=2".parse::<Op>(), Ok(Op::RemoveProperty(2)));
        assert_eq!(
            "move-property=0:2".parse::<Op>(),
            Ok(Op::MoveProperty { from: 0, to: 2 })
        );
        assert_eq!("add-panel".parse::<Op>(), Ok(Op::AddPanel));
        assert_eq!("remove-panel=1".parse::<Op>(), Ok(Op::RemovePanel(1)));
    }

    #[test]
    fn rejects_malformed_operations() {
        assert!("move-property=0".parse::<Op>().is_err());
        assert!("remove-panel=x".parse::<Op>().is_err());
        assert!("add-panel=3".parse::<Op>().is_err());
        assert!("shuffle".parse::<Op>().is_err());
    }

    #[test]
    fn inline_payloads_are_parsed_when_no_file_exists() {
        let value = load_value(r#"{"panels": []}"#, "params").unwrap();
        assert_eq!(value["panels"], serde_json::json!([]));
    }

    #[test]
    fn output_format_follows_file_extension() {
        let cli = Cli::parse_from(["infowall", "--params", "{}", "-o", "wall.json"]);
        let options = build_output_options(&cli).unwrap();
        assert_eq!(options.format, DocumentFormat::Json);
        assert_eq!(options.destinations, vec![OutputDestination::file(Path::new("wall.json"))]);
    }
}
