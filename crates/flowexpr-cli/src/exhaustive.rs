//! The exhaustive property harness.
//!
//! Enumerates every tree shape up to a leaf limit, every leaf choice from
//! the digit cascade, and every variable assignment, and checks the
//! pipeline properties for each generated expression: parse/format
//! round-trip, simplification and normalization semantics, the
//! normalization post-condition, and classifier equivalence.
//!
//! With `--parallel=N` the work is partitioned across `N` spawned worker
//! processes (round-robin by case index); workers communicate only by exit
//! status, and the parent reaps them all and propagates the first failure.

use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};

use flowexpr_ast::{Assignment, Expr, SymbolTable};
use flowexpr_harness::{
    Classifier, LeafChoice, Shape, build_shape, harness_string_map, leaf_choices, packet_for,
    test_symtab, tree_shapes,
};
use flowexpr_parser::compile;
use flowexpr_passes::{normalize, simplify};

use crate::{Cli, Operation, parse_relops};

pub fn run(cli: &Cli, n: u32) -> Result<()> {
    if cli.parallel > 1 && cli.worker_count.is_none() {
        return spawn_workers(cli, n);
    }
    run_partition(cli, n)
}

/// Fork-and-wait parallelism: re-invoke this executable once per worker
/// with a hidden partition assignment.
fn spawn_workers(cli: &Cli, n: u32) -> Result<()> {
    let exe = std::env::current_exe().context("locating the current executable")?;
    let mut children = Vec::new();
    for index in 0..u64::from(cli.parallel) {
        let mut command = Command::new(&exe);
        command
            .arg("--nvars")
            .arg(cli.nvars.to_string())
            .arg("--svars")
            .arg(cli.svars.to_string())
            .arg("--bits")
            .arg(cli.bits.to_string())
            .arg("--relops")
            .arg(&cli.relops)
            .arg("--operation")
            .arg(operation_name(cli.operation))
            .arg("--worker-index")
            .arg(index.to_string())
            .arg("--worker-count")
            .arg(u64::from(cli.parallel).to_string());
        for _ in 0..cli.more {
            command.arg("--more");
        }
        command.arg("exhaustive").arg(n.to_string());
        command.stdout(Stdio::null()).stderr(Stdio::inherit());
        let child = command
            .spawn()
            .with_context(|| format!("spawning worker {index}"))?;
        children.push((index, child));
    }

    let mut first_failure = None;
    for (index, mut child) in children {
        let status = child.wait().with_context(|| format!("reaping worker {index}"))?;
        if !status.success() && first_failure.is_none() {
            first_failure = Some((index, status));
        }
    }
    if let Some((index, status)) = first_failure {
        bail!("worker {index} failed with {status}");
    }
    println!("all {} workers passed", cli.parallel);
    Ok(())
}

fn operation_name(operation: Operation) -> &'static str {
    match operation {
        Operation::Convert => "convert",
        Operation::Simplify => "simplify",
        Operation::Normalize => "normalize",
        Operation::Flow => "flow",
    }
}

fn run_partition(cli: &Cli, n: u32) -> Result<()> {
    let nvars = cli.nvars as usize;
    let svars = cli.svars as usize;
    let relops = parse_relops(&cli.relops)?;
    let symtab = test_symtab(nvars, svars, cli.bits);
    let choices = leaf_choices(nvars, svars, cli.bits, &relops, cli.more > 0);
    if choices.is_empty() {
        bail!("no leaf choices: raise --nvars or --svars");
    }
    let sigmas = flowexpr_harness::assignments(nvars, svars, cli.bits);
    let string_map = harness_string_map();

    let mut case: u64 = 0;
    let mut tested: u64 = 0;
    for n_leaves in 1..=n {
        for shape in tree_shapes(n_leaves) {
            let roots: &[bool] = if n_leaves == 1 { &[true] } else { &[true, false] };
            for &root_is_and in roots {
                let mut digits = vec![0usize; shape.n_leaves()];
                loop {
                    case += 1;
                    let mine = match (cli.worker_index, cli.worker_count) {
                        (Some(index), Some(count)) => case % count == index,
                        _ => true,
                    };
                    if mine {
                        let leaves: Vec<LeafChoice> =
                            digits.iter().map(|&d| choices[d].clone()).collect();
                        let expr = build_shape(&shape, &leaves, root_is_and, &symtab);
                        test_one(&expr, cli.operation, &symtab, &sigmas, &string_map)?;
                        tested += 1;
                    }
                    if !advance(&mut digits, choices.len()) {
                        break;
                    }
                }
            }
        }
    }
    println!("tested {tested} expressions");
    Ok(())
}

/// Increment a little-endian odometer; false when it wraps to zero.
fn advance(digits: &mut [usize], radix: usize) -> bool {
    for digit in digits.iter_mut() {
        *digit += 1;
        if *digit < radix {
            return true;
        }
        *digit = 0;
    }
    false
}

/// Check every property the selected operation covers for one expression.
fn test_one(
    expr: &Expr,
    operation: Operation,
    symtab: &SymbolTable,
    sigmas: &[Assignment],
    string_map: &std::collections::HashMap<String, u32>,
) -> Result<()> {
    let text = expr.to_string();

    // Parse/format round-trip.
    let reparsed =
        compile(&text, symtab).with_context(|| format!("re-parsing formatted `{text}`"))?;
    for sigma in sigmas {
        if expr.evaluate(sigma) != reparsed.evaluate(sigma) {
            bail!(
                "round-trip diverges\n  expression: {text}\n  reparsed:   {reparsed}\n  witness:    {sigma}"
            );
        }
    }
    if operation < Operation::Simplify {
        return Ok(());
    }

    let slim = simplify(expr.clone());
    if !slim.honors_invariants() {
        bail!("simplify broke invariants\n  expression: {text}\n  simplified: {slim}");
    }
    for sigma in sigmas {
        if expr.evaluate(sigma) != slim.evaluate(sigma) {
            bail!(
                "simplify diverges\n  expression: {text}\n  simplified: {slim}\n  witness:    {sigma}"
            );
        }
    }
    if operation < Operation::Normalize {
        return Ok(());
    }

    let norm = normalize(slim);
    if !norm.is_normalized() {
        bail!("normalize post-condition failed\n  expression: {text}\n  normalized: {norm}");
    }
    for sigma in sigmas {
        if expr.evaluate(sigma) != norm.evaluate(sigma) {
            bail!(
                "normalize diverges\n  expression: {text}\n  normalized: {norm}\n  witness:    {sigma}"
            );
        }
    }
    if operation < Operation::Flow {
        return Ok(());
    }

    let flows = flowexpr_flows::to_matches(norm.clone(), string_map);
    let mut classifier = Classifier::new();
    classifier.insert_matches(&flows, 0);
    for sigma in sigmas {
        let packet = packet_for(sigma, symtab, string_map);
        if classifier.lookup(&packet) != expr.evaluate(sigma) {
            bail!(
                "classifier diverges\n  expression: {text}\n  normalized: {norm}\n  flows:\n{flows}\n  witness:    {sigma}"
            );
        }
    }
    Ok(())
}

/// Render a tree shape as nested groups of leaves.
pub fn render_shape(shape: &Shape) -> String {
    match shape {
        Shape::Leaf => "L".to_string(),
        Shape::Node(children) => {
            let parts: Vec<String> = children.iter().map(render_shape).collect();
            format!("({})", parts.join(" "))
        }
    }
}
