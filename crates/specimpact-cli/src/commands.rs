//! CLI command implementations.

use crate::manifest::{Manifest, MANIFEST_FILE};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use specimpact_core::{ArtifactKind, ArtifactSource};
use specimpact_graph::{
    export as render_graph, Direction, ExportFormat, Focus, GraphStore, ImpactGraph, ImpactQuery,
};
use specimpact_link::{IncrementalUpdater, LinkInference, UpdateReport};
use specimpact_server::{ImpactServer, ServerConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

const DATA_DIR: &str = ".specimpact";

fn store_path(root: &Path) -> PathBuf {
    root.join(DATA_DIR).join("graph")
}

/// Initialize SpecImpact in a directory.
pub fn init(path: &Path) -> Result<()> {
    let data_dir = path.join(DATA_DIR);

    if data_dir.exists() {
        println!("{} Already initialized", "✓".green());
        return Ok(());
    }

    fs::create_dir_all(&data_dir)?;

    // Seed an empty manifest so `build` has something to read.
    let manifest_path = path.join(MANIFEST_FILE);
    if !manifest_path.exists() {
        let empty = serde_json::json!({ "artifacts": [] });
        fs::write(&manifest_path, serde_json::to_string_pretty(&empty)?)?;
    }

    println!("{} Initialized SpecImpact in {}", "✓".green(), path.display());
    println!(
        "  List your artifacts in {} and run {}",
        MANIFEST_FILE.cyan(),
        "specimpact build".cyan()
    );

    Ok(())
}

/// Build or refresh the graph from the manifest.
pub fn build(path: &Path, force: bool) -> Result<()> {
    let manifest = Manifest::load(path)?;
    println!("{}", "Linking artifacts...".cyan());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message("Inferring links...");

    let store = GraphStore::open(store_path(path))?;
    let inference = LinkInference::new(Box::new(manifest.clone()));

    let mut updater = if force {
        IncrementalUpdater::new(inference)
    } else {
        match store.load()? {
            Some(graph) => IncrementalUpdater::with_graph(inference, graph)?,
            None => IncrementalUpdater::new(inference),
        }
    };

    let report = updater.refresh_from(&manifest, None)?;
    let snapshot = updater.snapshot();
    store.save(&snapshot)?;

    spinner.finish_and_clear();

    let stats = snapshot.stats();
    println!(
        "{} Linked {} artifacts ({} specs, {} code, {} tests), {} edges",
        "✓".green(),
        stats.node_count.to_string().cyan(),
        stats.specs,
        stats.code,
        stats.tests,
        stats.edge_count.to_string().cyan()
    );
    print_report(&report);

    Ok(())
}

/// Query the impact of changing one or more artifacts.
pub fn impact(
    path: &Path,
    starts: &[String],
    depth: usize,
    direction: &str,
    kinds: &[String],
    suggested: bool,
    json: bool,
) -> Result<()> {
    let graph = load_graph(path)?;

    // Starts may be ids or file paths.
    let mut start_ids = Vec::new();
    for start in starts {
        if graph.contains(start) {
            start_ids.push(start.clone());
            continue;
        }
        let at_path = graph.find_by_path(start);
        if at_path.is_empty() {
            eprintln!("{} Unknown artifact: {}", "⚠".yellow(), start);
        }
        start_ids.extend(at_path.into_iter().map(|node| node.id.clone()));
    }

    let direction: Direction = direction.parse()?;
    let mut query = ImpactQuery::new(start_ids, depth, direction);
    if !kinds.is_empty() {
        let parsed = kinds
            .iter()
            .map(|kind| kind.parse::<ArtifactKind>())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        query = query.with_kinds(parsed);
    }
    if suggested {
        query = query.with_suggested();
    }

    let set = graph.impact(&query);

    if json {
        println!("{}", serde_json::to_string_pretty(&set)?);
        return Ok(());
    }

    if set.is_empty() {
        println!("No impacted artifacts within depth {}", depth);
        return Ok(());
    }

    println!(
        "{} artifacts impacted ({}, depth ≤ {}):\n",
        set.total().to_string().bold(),
        direction,
        depth
    );
    print_bucket("Specs", &set.specs);
    print_bucket("Code", &set.code);
    print_bucket("Tests", &set.tests);

    Ok(())
}

fn print_bucket(label: &str, entries: &[specimpact_graph::ImpactEntry]) {
    if entries.is_empty() {
        return;
    }
    println!("{}", format!("{}:", label).cyan());
    for entry in entries {
        println!(
            "  {} {} {}",
            format!("{:.2}", entry.confidence).yellow(),
            entry.id,
            format!("({}, depth {})", entry.path, entry.depth).dimmed()
        );
    }
    println!();
}

/// Show one artifact and its edges.
pub fn node(path: &Path, id: &str) -> Result<()> {
    let graph = load_graph(path)?;

    let node = graph
        .get(id)
        .ok_or_else(|| format!("Artifact '{}' not found in graph", id))?;

    println!("{} {}", node.kind.to_string().yellow(), node.id.cyan());
    println!("  {} {}", "path:".dimmed(), node.path);
    for (key, value) in &node.metadata {
        println!("  {} {}", format!("{}:", key).dimmed(), value);
    }

    let outgoing = graph.forward_edges(id, None);
    if !outgoing.is_empty() {
        println!("\n{}", "Outgoing:".cyan());
        for record in &outgoing {
            println!(
                "  {} {} {} ({:.2}, {})",
                record.relationship.to_string().yellow(),
                "→".dimmed(),
                record.target,
                record.confidence,
                record.origin
            );
        }
    }

    let incoming = graph.reverse_edges(id, None);
    if !incoming.is_empty() {
        println!("\n{}", "Incoming:".cyan());
        for record in &incoming {
            println!(
                "  {} {} {} ({:.2}, {})",
                record.relationship.to_string().yellow(),
                "←".dimmed(),
                record.source,
                record.confidence,
                record.origin
            );
        }
    }

    Ok(())
}

/// Export the graph.
pub fn export(
    path: &Path,
    format: &str,
    output: Option<&Path>,
    focus: Option<&str>,
    radius: usize,
) -> Result<()> {
    let graph = load_graph(path)?;
    let format: ExportFormat = format.parse()?;

    let focus = match focus {
        Some(node_id) => {
            if !graph.contains(node_id) {
                return Err(format!("Artifact '{}' not found in graph", node_id).into());
            }
            Some(Focus {
                node_id: node_id.to_string(),
                radius,
            })
        }
        None => None,
    };

    let content = render_graph(&graph, format, focus.as_ref())?;

    match output {
        Some(out_path) => {
            fs::write(out_path, content)?;
            println!("{} Exported to {}", "✓".green(), out_path.display());
        }
        None => println!("{}", content),
    }

    Ok(())
}

/// Re-link the given artifacts after a change.
pub fn update(path: &Path, changed: &[String]) -> Result<()> {
    if changed.is_empty() {
        println!("Nothing to update");
        return Ok(());
    }

    let manifest = Manifest::load(path)?;
    let store = GraphStore::open(store_path(path))?;
    let graph = store
        .load()?
        .ok_or("Graph not built yet; run `specimpact build` first")?;

    let inference = LinkInference::new(Box::new(manifest.clone()));
    let mut updater = IncrementalUpdater::with_graph(inference, graph)?;

    // Re-register from the manifest so references and metadata are
    // current before linking.
    for artifact in manifest.list_changed(None) {
        updater.register(artifact)?;
    }

    let report = updater.update(changed);
    store.save(&updater.snapshot())?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &UpdateReport) {
    println!(
        "  {} added, {} removed, {} unchanged",
        report.edges_added.to_string().green(),
        report.edges_removed.to_string().red(),
        report.edges_unchanged
    );
    for conflict in &report.conflicts {
        println!(
            "  {} declared edge {} kept ({:.2} proposed)",
            "⚠".yellow(),
            conflict.key,
            conflict.proposed_confidence
        );
    }
    for id in &report.failed_artifacts {
        println!("  {} update failed for {}", "✗".red(), id);
    }
}

/// Start the SpecImpact server.
pub async fn serve(port: u16, headless: bool, path: &Path) -> Result<()> {
    let bind_addr = if headless { "0.0.0.0" } else { "127.0.0.1" };

    if headless {
        println!("{}", "Starting SpecImpact server in headless mode...".cyan());
    } else {
        println!("{}", "Starting SpecImpact server...".cyan());
    }

    let manifest = Manifest::load(path)?;
    let store = GraphStore::open(store_path(path))?;
    let inference = LinkInference::new(Box::new(manifest.clone()));

    let mut updater = match store.load()? {
        Some(graph) => IncrementalUpdater::with_graph(inference, graph)?,
        None => IncrementalUpdater::new(inference),
    };
    updater.refresh_from(&manifest, None)?;
    store.save(&updater.snapshot())?;

    let stats = updater.snapshot().stats();
    println!(
        "{} Linked {} artifacts, {} edges",
        "✓".green(),
        stats.node_count,
        stats.edge_count
    );

    let addr = format!("{}:{}", bind_addr, port).parse()?;
    let config = ServerConfig { addr };
    let server = ImpactServer::new(updater, config);

    println!("{} Listening on ws://{}:{}", "✓".green(), bind_addr, port);
    if headless {
        println!("  Headless mode: accepting connections from any host");
    }
    println!("  Press {} to stop", "Ctrl+C".cyan());

    server.run().await.map_err(|e| e.to_string())?;

    Ok(())
}

/// Show graph status.
pub fn status(path: &Path) -> Result<()> {
    let data_dir = path.join(DATA_DIR);

    if !data_dir.exists() {
        println!("{} SpecImpact not initialized in this directory", "✗".red());
        println!("  Run {} to initialize", "specimpact init".cyan());
        return Ok(());
    }

    let store = GraphStore::open(store_path(path))?;
    let Some(graph) = store.load()? else {
        println!("{} No graph built yet", "✗".red());
        println!("  Run {} to build it", "specimpact build".cyan());
        return Ok(());
    };

    let stats = graph.stats();
    println!("{}", "SpecImpact Status".cyan().bold());
    println!();
    println!("  {} {}", "Specs:".dimmed(), stats.specs);
    println!("  {} {}", "Code:".dimmed(), stats.code);
    println!("  {} {}", "Tests:".dimmed(), stats.tests);
    println!("  {} {}", "Edges:".dimmed(), stats.edge_count);

    Ok(())
}

fn load_graph(path: &Path) -> Result<ImpactGraph> {
    let store = GraphStore::open(store_path(path))?;
    store
        .load()?
        .ok_or_else(|| "Graph not built yet; run `specimpact build` first".into())
}
