use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use clap::Parser;
use clap::Subcommand;
use math_parser::{EvalError, Stores, build_tree, parse_and_evaluate, tokenize};
use miette::NamedSource;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Evaluate arithmetic expressions over integer and float variables")]
struct Args {
    /// Log engine internals to stderr (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the tokens of an expression.
    Tokenize {
        expression: String,
        #[command(flatten)]
        vars: Vars,
    },
    /// Print the context tree of an expression.
    Tree {
        expression: String,
        #[command(flatten)]
        vars: Vars,
    },
    /// Evaluate an expression.
    Eval {
        expression: String,
        #[command(flatten)]
        vars: Vars,
        /// Print every variable after evaluation.
        #[arg(long = "vars")]
        show_vars: bool,
    },
}

#[derive(Debug, clap::Args)]
struct Vars {
    /// Define an integer variable.
    #[arg(long = "int", value_name = "NAME=VALUE", value_parser = parse_binding::<i64>)]
    ints: Vec<(String, i64)>,

    /// Define a float variable.
    #[arg(long = "float", value_name = "NAME=VALUE", value_parser = parse_binding::<f64>)]
    floats: Vec<(String, f64)>,
}

impl Vars {
    fn into_stores(self) -> (BTreeMap<String, f64>, BTreeMap<String, i64>) {
        (
            self.floats.into_iter().collect(),
            self.ints.into_iter().collect(),
        )
    }
}

fn parse_binding<T>(binding: &str) -> Result<(String, T), String>
where
    T: FromStr,
    T::Err: Display,
{
    let (name, value) = binding
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{binding}`"))?;
    let value = value
        .trim()
        .parse()
        .map_err(|e| format!("bad value for `{name}`: {e}"))?;
    Ok((name.trim().to_string(), value))
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(expression: &str, error: EvalError) -> ! {
    let code = if error.is_syntax() { 65 } else { 70 };
    let report = miette::Report::new(error)
        .with_source_code(NamedSource::new("<expression>", expression.to_string()));
    eprintln!("{report:?}");
    std::process::exit(code);
}

fn main() -> miette::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Commands::Tokenize { expression, vars } => {
            let (mut floats, mut ints) = vars.into_stores();
            let stores = Stores::new(&mut floats, &mut ints);
            let tokens = tokenize(&expression, &stores).unwrap_or_else(|e| fail(&expression, e));
            for token in tokens {
                println!("{token}");
            }
        }
        Commands::Tree { expression, vars } => {
            let (mut floats, mut ints) = vars.into_stores();
            let stores = Stores::new(&mut floats, &mut ints);
            let tree = tokenize(&expression, &stores)
                .and_then(build_tree)
                .unwrap_or_else(|e| fail(&expression, e));
            println!("{tree}");
        }
        Commands::Eval {
            expression,
            vars,
            show_vars,
        } => {
            let (mut floats, mut ints) = vars.into_stores();
            let evaluation = parse_and_evaluate(&expression, &mut floats, &mut ints)
                .unwrap_or_else(|e| fail(&expression, e));
            match evaluation.assignment {
                Some(assignment) => println!("{} = {}", assignment.name, assignment.value),
                None => println!("{}", evaluation.value),
            }

            if show_vars {
                for (name, value) in &ints {
                    println!("int {name} = {value}");
                }
                for (name, value) in &floats {
                    println!("float {name} = {value}");
                }
            }
        }
    }
    Ok(())
}
