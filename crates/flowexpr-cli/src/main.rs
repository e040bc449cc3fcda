//! `flowexpr` — test driver for the match-expression compiler.
//!
//! Exercises every pipeline stage from the command line and runs the
//! exhaustive property harness (`exhaustive N`), optionally across
//! process-level workers (`--parallel=N`). Exit status is 0 on success and
//! non-zero on the first detected property violation, with a diagnostic
//! naming the offending expression, its transformed form, and the
//! assignment that witnessed the divergence.

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use flowexpr_ast::Assignment;
use flowexpr_harness::{compositions, network_symtab, test_symtab, tree_shapes};
use flowexpr_lexer::Lexer;
use flowexpr_parser::{annotate, compile, parse_assignments};
use flowexpr_passes::{normalize, simplify};
use flowexpr_token::TokenKind;

mod exhaustive;

#[derive(Parser)]
#[command(name = "flowexpr", about = "flowexpr compiler test driver", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Numeric test variables n0..n<NVARS-1>
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(0..=4))]
    nvars: u8,

    /// String test variables s0..s<SVARS-1>
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=4))]
    svars: u8,

    /// Width of the numeric test variables in bits
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=3))]
    bits: u8,

    /// Relational operators the exhaustive harness draws from
    #[arg(long, default_value = "==,!=")]
    relops: String,

    /// How far to take each generated expression
    #[arg(long, value_enum, default_value = "flow")]
    operation: Operation,

    /// Worker processes for the exhaustive harness
    #[arg(long, default_value_t = 1)]
    parallel: u32,

    /// Widen mask/value coverage (repeatable)
    #[arg(short = 'm', long = "more", action = ArgAction::Count)]
    more: u8,

    /// Partition index when running as a spawned worker
    #[arg(long, hide = true)]
    worker_index: Option<u64>,

    /// Partition count when running as a spawned worker
    #[arg(long, hide = true)]
    worker_count: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Tokenize each argument and print the canonical token text
    Lex { inputs: Vec<String> },
    /// Parse an expression against the network symbol table
    ParseExpr { expr: String },
    /// Parse and annotate an expression
    AnnotateExpr { expr: String },
    /// Parse, annotate, and simplify an expression
    SimplifyExpr { expr: String },
    /// Parse, annotate, simplify, and normalize an expression
    NormalizeExpr { expr: String },
    /// Compile an expression all the way to classifier flows
    ExprToFlows { expr: String },
    /// Evaluate an expression under an assignment of the test variables
    ///
    /// NUMS is a comma-separated list assigning n0, n1, …; STRS likewise
    /// for s0, s1, … (empty string for none).
    EvaluateExpr { nums: String, strs: String, expr: String },
    /// Print all compositions of N
    Composition { n: u32 },
    /// Print all tree shapes with N leaves
    TreeShape { n: u32 },
    /// Run the exhaustive property harness over trees of up to N leaves
    Exhaustive { n: u32 },
    /// Parse an action body (assignment list) and print it back
    ParseActions { actions: String },
}

/// How far the exhaustive harness takes each expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Operation {
    /// Parse/format round-trip only
    Convert,
    /// ... plus semantics-preserving simplification
    Simplify,
    /// ... plus DNF normalization and its post-condition
    Normalize,
    /// ... plus lowering to flows and classifier equivalence
    Flow,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Command::Lex { inputs } => {
            for input in inputs {
                println!("{}", lex_line(input));
            }
            Ok(())
        }
        Command::ParseExpr { expr } => {
            let parsed = compile(expr, &network_symtab())?;
            println!("{parsed}");
            Ok(())
        }
        Command::AnnotateExpr { expr } => {
            let symtab = network_symtab();
            let annotated = annotate(compile(expr, &symtab)?, &symtab)?;
            println!("{annotated}");
            Ok(())
        }
        Command::SimplifyExpr { expr } => {
            let symtab = network_symtab();
            let slim = simplify(annotate(compile(expr, &symtab)?, &symtab)?);
            println!("{slim}");
            Ok(())
        }
        Command::NormalizeExpr { expr } => {
            let symtab = network_symtab();
            let norm = normalize(simplify(annotate(compile(expr, &symtab)?, &symtab)?));
            println!("{norm}");
            Ok(())
        }
        Command::ExprToFlows { expr } => {
            let symtab = network_symtab();
            let norm = normalize(simplify(annotate(compile(expr, &symtab)?, &symtab)?));
            let flows = flowexpr_flows::to_matches(norm, &demo_port_map());
            println!("{flows}");
            if flows.n_conjunctions > 0 {
                println!("({} conjunction groups)", flows.n_conjunctions);
            }
            Ok(())
        }
        Command::EvaluateExpr { nums, strs, expr } => {
            let symtab = test_symtab(cli.nvars as usize, cli.svars as usize, cli.bits);
            let sigma = parse_assignment(nums, strs)?;
            let parsed = annotate(compile(expr, &symtab)?, &symtab)?;
            println!("{}", parsed.evaluate(&sigma));
            Ok(())
        }
        Command::Composition { n } => {
            let all = compositions(*n);
            for composition in &all {
                let parts: Vec<String> = composition.iter().map(u32::to_string).collect();
                println!("{}", parts.join(" "));
            }
            println!("{} compositions of {n}", all.len());
            Ok(())
        }
        Command::TreeShape { n } => {
            let shapes = tree_shapes(*n);
            for shape in &shapes {
                println!("{}", exhaustive::render_shape(shape));
            }
            println!("{} tree shapes with {n} leaves", shapes.len());
            Ok(())
        }
        Command::Exhaustive { n } => exhaustive::run(&cli, *n),
        Command::ParseActions { actions } => {
            let symtab = network_symtab();
            let body = parse_assignments(actions, &symtab)?;
            for load in &body.loads {
                println!("{load};");
            }
            println!("prereq: {}", body.prereq);
            Ok(())
        }
    }
}

fn lex_line(input: &str) -> String {
    let mut parts = Vec::new();
    for token in Lexer::new(input) {
        match &token.kind {
            TokenKind::Error(message) => parts.push(format!("error({message:?})")),
            kind => parts.push(kind.to_string()),
        }
    }
    parts.join(" ")
}

/// The port map the flow commands resolve logical port names against.
fn demo_port_map() -> std::collections::HashMap<String, u32> {
    (1..=4).map(|i| (format!("lp{i}"), i)).collect()
}

fn parse_assignment(nums: &str, strs: &str) -> Result<Assignment> {
    let mut sigma = Assignment::new();
    for (i, part) in split_list(nums).iter().enumerate() {
        let value: u128 = part
            .parse()
            .with_context(|| format!("numeric assignment `{part}` is not an integer"))?;
        sigma.set_num(&format!("n{i}"), value);
    }
    for (i, part) in split_list(strs).iter().enumerate() {
        sigma.set_str(&format!("s{i}"), part);
    }
    Ok(sigma)
}

fn split_list(list: &str) -> Vec<String> {
    if list.is_empty() {
        return Vec::new();
    }
    list.split(',').map(str::to_string).collect()
}

/// Parse `--relops` into operator values.
pub fn parse_relops(spec: &str) -> Result<Vec<flowexpr_ast::RelOp>> {
    use flowexpr_ast::RelOp;
    let mut relops = Vec::new();
    for part in spec.split(',') {
        let relop = match part.trim() {
            "==" | "=" => RelOp::Eq,
            "!=" | "!" => RelOp::Ne,
            "<" => RelOp::Lt,
            "<=" => RelOp::Le,
            ">" => RelOp::Gt,
            ">=" => RelOp::Ge,
            other => bail!("unknown relational operator `{other}` in --relops"),
        };
        if !relops.contains(&relop) {
            relops.push(relop);
        }
    }
    if relops.is_empty() {
        bail!("--relops selects no operators");
    }
    Ok(relops)
}
