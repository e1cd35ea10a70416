use std::{env, io, path, rc::Rc};

use anyhow::{anyhow, Context};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use itertools::Itertools;

#[derive(Parser)]
#[command(version, about, long_about = None, author = clap::crate_authors!(), subcommand_required = true)]
#[command(group(ArgGroup::new("input").required(true).args(["svd", "json"])))]
struct Cli {
    /// CMSIS-SVD source file for peripheral descriptions
    #[arg(long)]
    svd: Option<String>,

    /// JSON descriptor file, as written by `dump-json`
    #[arg(long)]
    json: Option<String>,

    #[arg(long = "validate", default_value = ValidateLevel(regview::ValidateLevel::Weak))]
    validate_level: ValidateLevel,

    /// Only include peripherals whose name matches this regex
    #[arg(long)]
    include: Option<String>,

    /// Exclude peripherals whose name matches this regex
    #[arg(long)]
    exclude: Option<String>,

    #[command(flatten)]
    verbose: Verbosity<WarnLevel>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the regview parser without doing anything
    DryRun,
    /// List all peripherals in the supplied source
    ///
    /// Peripherals containing zero registers are omitted.
    LsPeriph {
        /// Only list peripherals without register counts
        #[arg(long, action = clap::ArgAction::SetTrue)]
        no_count: bool,
        #[arg(long, default_value = "alpha")]
        sorting: Sorting,
        /// List peripherals by group
        #[arg(long, action = clap::ArgAction::SetTrue)]
        groups: bool,
    },
    /// List the registers and bit-fields of a peripheral
    LsRegs { periph: String },
    /// Show the fields of a register holding the given value
    Decode {
        periph: String,
        reg: String,
        #[arg(value_parser = clap_num::maybe_hex::<u64>)]
        value: u64,
        /// Base used to display values
        #[arg(long, default_value = Base(regview::DisplayBase::Hex))]
        base: Base,
    },
    /// Modify fields of a register holding the given value, showing the outcome
    Modify {
        periph: String,
        reg: String,
        #[arg(value_parser = clap_num::maybe_hex::<u64>)]
        value: u64,
        /// Field assignment as `FIELD=VALUE`, where VALUE is a number or the name of an enumerated
        /// value. Applied in order.
        #[arg(long = "set", required = true, action = clap::ArgAction::Append)]
        assignments: Vec<String>,
        /// Base used to display values
        #[arg(long, default_value = Base(regview::DisplayBase::Hex))]
        base: Base,
        /// Show the write request emitted for each assignment
        #[arg(long, action = clap::ArgAction::SetTrue)]
        auto_write: bool,
    },
    /// Print the selected peripherals in the JSON descriptor format
    DumpJson,
}

#[derive(Clone, Copy)]
enum Sorting {
    Preserve,
    Alpha,
}

impl ValueEnum for Sorting {
    fn value_variants<'a>() -> &'a [Self] {
        &[Sorting::Alpha, Sorting::Preserve]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        use clap::builder::PossibleValue;
        match self {
            Sorting::Alpha => Some(PossibleValue::new("alpha")),
            Sorting::Preserve => Some(PossibleValue::new("preserve")),
        }
    }
}

#[derive(Clone)]
struct ValidateLevel(regview::ValidateLevel);

impl From<ValidateLevel> for regview::ValidateLevel {
    fn from(value: ValidateLevel) -> Self {
        value.0
    }
}

impl From<ValidateLevel> for clap::builder::OsStr {
    fn from(value: ValidateLevel) -> Self {
        match value.0 {
            regview::ValidateLevel::Disabled => "disabled".into(),
            regview::ValidateLevel::Weak => "weak".into(),
            regview::ValidateLevel::Strict => "strict".into(),
        }
    }
}

impl ValueEnum for ValidateLevel {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            Self(regview::ValidateLevel::Disabled),
            Self(regview::ValidateLevel::Weak),
            Self(regview::ValidateLevel::Strict),
        ]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        use clap::builder::PossibleValue;
        match self.0 {
            regview::ValidateLevel::Disabled => Some(PossibleValue::new("disabled")),
            regview::ValidateLevel::Weak => Some(PossibleValue::new("weak")),
            regview::ValidateLevel::Strict => Some(PossibleValue::new("strict")),
        }
    }
}

#[derive(Clone, Copy)]
struct Base(regview::DisplayBase);

impl From<Base> for clap::builder::OsStr {
    fn from(value: Base) -> Self {
        match value.0 {
            regview::DisplayBase::Hex => "hex".into(),
            regview::DisplayBase::Decimal => "decimal".into(),
            regview::DisplayBase::Binary => "binary".into(),
        }
    }
}

impl ValueEnum for Base {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            Self(regview::DisplayBase::Hex),
            Self(regview::DisplayBase::Decimal),
            Self(regview::DisplayBase::Binary),
        ]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        use clap::builder::PossibleValue;
        match self.0 {
            regview::DisplayBase::Hex => Some(PossibleValue::new("hex")),
            regview::DisplayBase::Decimal => Some(PossibleValue::new("decimal")),
            regview::DisplayBase::Binary => Some(PossibleValue::new("binary")),
        }
    }
}

fn string_to_path(s: &str) -> Result<path::PathBuf, io::Error> {
    env::current_dir()?
        .join(s)
        // Canonicalize paths for clear output
        .canonicalize()
}

fn get_source(cli: &Cli) -> anyhow::Result<regview::ModelSource> {
    let (s, format) = match (&cli.svd, &cli.json) {
        (Some(s), _) => (s, regview::SourceFormat::Svd),
        (None, Some(s)) => (s, regview::SourceFormat::Json),
        (None, None) => return Err(anyhow!("no input file given")),
    };
    let path = string_to_path(s).with_context(|| format!("file does not exist: {s}"))?;

    // Make sure the source path corresponds to a file
    if !path.is_file() {
        return Err(anyhow!("not a file: {}", path.display()));
    }
    Ok(regview::ModelSource::new(path, format))
}

fn get_filters(cli: &Cli) -> anyhow::Result<regview::Filters> {
    if cli.include.is_none() && cli.exclude.is_none() {
        return Ok(regview::Filters::all());
    }
    let periph_filter =
        regview::ItemFilter::from_patterns(cli.include.as_deref(), cli.exclude.as_deref())
            .context("invalid peripheral filter")?;
    Ok(regview::Filters::from_filters(None, Some(periph_filter)))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    let source = get_source(&cli)?;
    let level: regview::ValidateLevel = cli.validate_level.clone().into();
    let filters = get_filters(&cli)?;

    if let Some(cmd) = &cli.command {
        match cmd {
            Command::DryRun => {
                match regview::dry_run(&source, level)
                    .with_context(|| format!("could not execute dry run for source: {source:?}"))
                {
                    Ok(_) => println!("regview: dry run completed successfully"),
                    Err(e) => println!("regview: exited unsuccessfully: {e:?}"),
                }
            }
            Command::LsPeriph {
                no_count,
                sorting,
                groups,
            } => {
                if *groups {
                    ls_groups(&source, &filters, level)?;
                } else {
                    ls_periph(&source, &filters, level, *sorting, *no_count)?;
                }
            }
            Command::LsRegs { periph } => {
                let device = regview::load_device(&source, &filters, level)?;
                ls_regs(&device, periph)?;
            }
            Command::Decode {
                periph,
                reg,
                value,
                base,
            } => {
                let device = regview::load_device(&source, &filters, level)?;
                let mut model = regview::build_register(&device, periph, reg)?;
                model.set_display_base(base.0);
                model.set_value(*value)?;
                print_register(&model);
            }
            Command::Modify {
                periph,
                reg,
                value,
                assignments,
                base,
                auto_write,
            } => {
                let device = regview::load_device(&source, &filters, level)?;
                let model = regview::build_register(&device, periph, reg)?;
                modify(model, *value, assignments, base.0, *auto_write)?;
            }
            Command::DumpJson => {
                let device = regview::load_device(&source, &filters, level)?;
                println!("{}", regview::device_to_json(&device));
            }
        }
    } else {
        println!("Nothing to do. Please issue a subcommand.")
    }

    Ok(())
}

fn ls_periph(
    source: &regview::ModelSource,
    filters: &regview::Filters,
    level: regview::ValidateLevel,
    sorting: Sorting,
    no_count: bool,
) -> Result<(), anyhow::Error> {
    let mut periph_and_count = regview::list_peripherals(source, filters, level)?;
    if periph_and_count.is_empty() {
        println!("regview: no peripherals with registers found in input");
        return Ok(());
    }
    match sorting {
        Sorting::Preserve => { /* do nothing */ }
        Sorting::Alpha => periph_and_count.sort(),
    };
    let longest = periph_and_count
        .iter()
        .map(|(s, _)| s.len())
        .max()
        .unwrap_or_default();
    for (periph, count) in periph_and_count {
        if no_count {
            println!("{periph}");
        } else {
            println!("{periph: <longest$} {count}");
        }
    }
    Ok(())
}

fn ls_groups(
    source: &regview::ModelSource,
    filters: &regview::Filters,
    level: regview::ValidateLevel,
) -> Result<(), anyhow::Error> {
    let device = regview::load_device(source, filters, level)?;
    for (group, members) in device.groups() {
        println!(
            "{group}: {}",
            members.iter().map(|p| p.name.as_str()).join(", ")
        );
    }
    Ok(())
}

fn ls_regs(device: &regview::Device, periph: &str) -> Result<(), anyhow::Error> {
    let descriptor = device
        .peripheral(periph)
        .ok_or_else(|| regview::ApiError::UnknownPeripheral(periph.to_owned()))?;
    println!(
        "{} @ {:#010x} : {}",
        descriptor.name, descriptor.base_address, descriptor.description
    );
    for reg in &descriptor.registers {
        println!("  {reg}");
        for field in &reg.fields {
            println!("    {field}");
            for e in &field.enums {
                println!("      {e}");
            }
        }
    }
    Ok(())
}

fn print_register(model: &regview::RegisterModel) {
    println!("{} @ {} = {}", model.name(), model.addr_repr(), model.text());
    for field in model.fields() {
        let selected = field
            .selected_enum()
            .map(|e| format!(" ({})", e.name))
            .unwrap_or_default();
        println!("  {} = {}{selected}", field.descriptor(), field.text());
    }
}

/// Resolve `text` as the name of an enumerated value of `field` or as a number
fn parse_field_value(field: &regview::FieldModel, text: &str) -> anyhow::Result<u64> {
    if let Some(e) = field.enums().iter().find(|e| e.name == text) {
        return Ok(e.value);
    }
    clap_num::maybe_hex::<u64>(text).map_err(|e| anyhow!("invalid value for {}: {e}", field.name()))
}

fn modify(
    mut model: regview::RegisterModel,
    value: u64,
    assignments: &[String],
    base: regview::DisplayBase,
    auto_write: bool,
) -> Result<(), anyhow::Error> {
    let log = Rc::new(regview::RequestLog::new());
    model.connect(log.clone());
    model.set_display_base(base);
    model.set_value(value)?;
    model.set_auto_write(auto_write);

    for assignment in assignments {
        let (name, text) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("expected FIELD=VALUE, got {assignment:?}"))?;
        let field = model
            .field(name)
            .ok_or_else(|| anyhow!("register {} has no field named {name:?}", model.name()))?;
        let field_value = parse_field_value(field, text)?;
        model
            .set_field_value(name, field_value)
            .with_context(|| format!("cannot apply {assignment}"))?;
    }

    print_register(&model);
    for request in log.take() {
        println!("{request}");
    }
    Ok(())
}
