// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Replay of recorded viewer sessions.
//!
//! A log is JSON lines, one [`ReplayStep`] per line. Blank lines and lines
//! starting with `#` are skipped.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use cad_scene_codec::{MockRenderer, RenderCall};
use cad_scene_port::ShapeId;
use cad_sync_proto::{Delta, KernelMessage};
use cad_viewer_core::{BindingStatus, CadView, RecordingTransport, ViewerConfig};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command line of the `cad-replay` binary.
#[derive(Parser, Debug)]
#[command(name = "cad-replay")]
#[command(about = "Replay recorded kernel traffic through a headless CAD viewer")]
pub struct Cli {
    /// Path to the JSONL session log
    #[arg(long)]
    pub log: PathBuf,
    /// Mesh decodes per tick (defaults to the viewer config)
    #[arg(long)]
    pub budget: Option<usize>,
    /// Report camera changes back to the kernel
    #[arg(long)]
    pub sync_view: bool,
}

/// One recorded step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ReplayStep {
    /// A message from the kernel.
    Inbound {
        /// The message.
        message: KernelMessage,
    },
    /// A frame tick at an absolute time.
    Tick {
        /// Milliseconds since the session started.
        at_ms: u64,
    },
    /// A local edit made through the viewer UI.
    Local {
        /// The edit.
        delta: Delta,
    },
    /// The host resized the canvas.
    Resize {
        /// Width in CSS pixels.
        width: u32,
        /// Height in CSS pixels.
        height: u32,
        /// Device pixel ratio.
        dpr: f32,
    },
}

/// Outcome of a replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    /// Steps replayed.
    pub steps: usize,
    /// Final structural version.
    pub tree_version: u64,
    /// Shapes in the final tree.
    pub shapes: usize,
    /// Final selection.
    pub selected: Vec<ShapeId>,
    /// True when a resync was still pending at the end.
    pub awaiting_full_state: bool,
    /// Renderer status (`ready`, `disposed`, `unavailable: ...`).
    pub renderer: String,
    /// Local edits the viewer refused.
    pub rejected_local: usize,
    /// Mesh uploads issued to the renderer.
    pub uploads: u32,
    /// Mesh removals issued to the renderer.
    pub removals: usize,
    /// Every renderer mutation issued, including uploads.
    pub render_calls: usize,
    /// Outbound messages by envelope op.
    pub outbound: BTreeMap<&'static str, usize>,
}

impl ReplayReport {
    /// Writes the report as `key: value` lines.
    pub fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        let selected = if self.selected.is_empty() {
            "(none)".to_owned()
        } else {
            self.selected
                .iter()
                .map(ShapeId::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        };
        writeln!(out, "steps: {}", self.steps)?;
        writeln!(out, "tree_version: {}", self.tree_version)?;
        writeln!(out, "shapes: {}", self.shapes)?;
        writeln!(out, "selected: {selected}")?;
        writeln!(out, "awaiting_full_state: {}", self.awaiting_full_state)?;
        writeln!(out, "renderer: {}", self.renderer)?;
        writeln!(out, "rejected_local: {}", self.rejected_local)?;
        writeln!(out, "uploads: {}", self.uploads)?;
        writeln!(out, "removals: {}", self.removals)?;
        writeln!(out, "render_calls: {}", self.render_calls)?;
        for (op, n) in &self.outbound {
            writeln!(out, "outbound.{op}: {n}")?;
        }
        Ok(())
    }
}

/// Parses a JSONL log. Errors name the offending line.
pub fn parse_log(reader: impl BufRead) -> Result<Vec<ReplayStep>> {
    let mut steps = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let step = serde_json::from_str(trimmed)
            .with_context(|| format!("parse step on line {}", idx + 1))?;
        steps.push(step);
    }
    Ok(steps)
}

/// Replays `steps` through a fresh headless view.
///
/// `budget` overrides the config's decode budget for every tick.
pub fn replay(
    steps: &[ReplayStep],
    mut config: ViewerConfig,
    budget: Option<usize>,
) -> Result<ReplayReport> {
    if let Some(budget) = budget {
        config.decode_budget = budget;
    }
    let mut view = CadView::new(config, MockRenderer::new(), RecordingTransport::new())
        .context("build viewer")?;
    let mut rejected_local = 0;

    for step in steps {
        match step {
            ReplayStep::Inbound { message } => {
                view.transport_mut().push_inbound(message.clone());
                view.pump(usize::MAX);
            }
            ReplayStep::Tick { at_ms } => view.tick(Duration::from_millis(*at_ms)),
            ReplayStep::Local { delta } => {
                if let Err(reason) = view.apply_local(delta) {
                    warn!(%reason, "local edit rejected");
                    rejected_local += 1;
                }
            }
            ReplayStep::Resize { width, height, dpr } => view.resize(*width, *height, *dpr),
        }
    }

    let mut outbound = BTreeMap::new();
    for msg in view.transport().sent() {
        *outbound.entry(msg.op_name()).or_insert(0) += 1;
    }
    let renderer = view.renderer();
    Ok(ReplayReport {
        steps: steps.len(),
        tree_version: view.scene().version(),
        shapes: view.scene().len(),
        selected: view.selection().ids(),
        awaiting_full_state: view.reconciler().awaiting_full_state(),
        renderer: match view.status() {
            BindingStatus::Ready => "ready".to_owned(),
            BindingStatus::Disposed => "disposed".to_owned(),
            BindingStatus::Unavailable(reason) => format!("unavailable: {reason}"),
        },
        rejected_local,
        uploads: renderer.total_uploads(),
        removals: renderer.count_calls(|c| matches!(c, RenderCall::Remove(_))),
        render_calls: renderer.count_calls(|c| {
            !matches!(c, RenderCall::Pick(..) | RenderCall::Export)
        }),
        outbound,
    })
}

/// CLI entry point.
pub fn entrypoint() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let file = File::open(&cli.log).with_context(|| format!("open {}", cli.log.display()))?;
    let steps = parse_log(BufReader::new(file))?;
    info!(steps = steps.len(), log = %cli.log.display(), "replaying");

    let config = ViewerConfig {
        sync_view: cli.sync_view,
        ..ViewerConfig::default()
    };
    let report = replay(&steps, config, cli.budget)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    report.write_to(&mut out)?;
    Ok(())
}
