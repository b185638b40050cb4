//! Research pipeline driven by the websocket endpoint.
//!
//! The endpoint only sees the [`ResearchAgent`] trait: an agent reports each
//! finished stage as a [`StageUpdate`] and returns the final report.
//! [`ScriptedAgent`] is a deterministic pipeline with the stages of the
//! production agent (memory lookup, planning, research passes, drafting,
//! critique, memory write) and no model calls.

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use shared::{
    error::AgentError,
    protocol::{ServerFrame, UpdateFrame},
};
use tokio::sync::{mpsc, RwLock, Semaphore};
use tracing::{debug, info};
use url::Url;

const QUERY_ANGLES: [&str; 3] = ["overview", "recent developments", "open challenges"];
const PASSING_SCORE: u32 = 70;
pub const MAX_TOPIC_CHARS: usize = 300;
pub const DEFAULT_RUN_LIMIT: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageUpdate {
    pub node: String,
    pub logs: Vec<String>,
    pub sources: Vec<String>,
    pub plan: Option<Vec<String>>,
    pub draft: Option<String>,
}

impl StageUpdate {
    fn new(node: &str, logs: impl IntoIterator<Item = String>) -> Self {
        Self {
            node: node.to_string(),
            logs: logs.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl From<StageUpdate> for ServerFrame {
    fn from(update: StageUpdate) -> Self {
        ServerFrame::Update(UpdateFrame {
            status: Some(format!("Finished {}", update.node)),
            node: Some(update.node),
            logs: update.logs,
            sources: update.sources,
            plan: update.plan,
            draft: update.draft,
            level: None,
        })
    }
}

#[async_trait]
pub trait ResearchAgent: Send + Sync {
    /// Researches `topic`, pushing one update per finished stage, and returns
    /// the final markdown report.
    async fn run(&self, topic: &str, updates: mpsc::Sender<StageUpdate>) -> Result<String>;
}

/// Reports from earlier runs, keyed by normalized topic.
#[derive(Debug, Default)]
pub struct ReportMemory {
    reports: RwLock<HashMap<String, String>>,
}

impl ReportMemory {
    pub async fn recall(&self, topic: &str) -> Option<String> {
        self.reports.read().await.get(&memory_key(topic)).cloned()
    }

    pub async fn remember(&self, topic: &str, report: &str) {
        self.reports
            .write()
            .await
            .insert(memory_key(topic), report.to_string());
    }
}

fn memory_key(topic: &str) -> String {
    topic.trim().to_lowercase()
}

#[derive(Debug, Clone)]
struct Finding {
    query: String,
    source: String,
}

pub struct ScriptedAgent {
    memory: Arc<ReportMemory>,
    search_base: Url,
    stage_delay: Duration,
    max_critique_rounds: u32,
    runs: Semaphore,
}

impl ScriptedAgent {
    pub fn new(
        memory: Arc<ReportMemory>,
        search_base_url: &str,
        stage_delay: Duration,
        max_critique_rounds: u32,
    ) -> Result<Self> {
        let search_base = Url::parse(search_base_url)
            .with_context(|| format!("invalid search base url '{search_base_url}'"))?;
        Ok(Self {
            memory,
            search_base,
            stage_delay,
            max_critique_rounds,
            runs: Semaphore::new(DEFAULT_RUN_LIMIT),
        })
    }

    /// Caps the number of runs in flight. Runs over the cap are refused with
    /// a `rate_limited` error rather than queued.
    pub fn with_run_limit(mut self, limit: usize) -> Self {
        self.runs = Semaphore::new(limit.max(1));
        self
    }

    async fn emit(&self, updates: &mpsc::Sender<StageUpdate>, update: StageUpdate) -> Result<()> {
        debug!(node = %update.node, "research stage finished");
        updates
            .send(update)
            .await
            .map_err(|_| anyhow!("research update receiver dropped"))?;
        if !self.stage_delay.is_zero() {
            tokio::time::sleep(self.stage_delay).await;
        }
        Ok(())
    }

    fn search_url(&self, query: &str) -> String {
        let mut url = self.search_base.clone();
        url.query_pairs_mut().clear().append_pair("q", query);
        url.to_string()
    }
}

#[async_trait]
impl ResearchAgent for ScriptedAgent {
    async fn run(&self, topic: &str, updates: mpsc::Sender<StageUpdate>) -> Result<String> {
        if topic.chars().count() > MAX_TOPIC_CHARS {
            return Err(AgentError::validation(format!(
                "Topic is longer than {MAX_TOPIC_CHARS} characters"
            ))
            .into());
        }
        let Ok(_permit) = self.runs.try_acquire() else {
            return Err(AgentError::rate_limited("Too many research sessions in progress").into());
        };

        if let Some(report) = self.memory.recall(topic).await {
            info!(topic, "research memory hit");
            self.emit(
                &updates,
                StageUpdate::new(
                    "check_memory",
                    ["--- Memory Hit! Returning cached report. ---".to_string()],
                ),
            )
            .await?;
            return Ok(report);
        }
        self.emit(
            &updates,
            StageUpdate::new(
                "check_memory",
                [
                    format!("Checking Memory for: {topic}"),
                    "--- No Memory Found. Proceeding to Plan. ---".to_string(),
                ],
            ),
        )
        .await?;

        let plan = plan_queries(topic);
        self.emit(
            &updates,
            StageUpdate {
                plan: Some(plan.clone()),
                ..StageUpdate::new(
                    "planner",
                    [
                        "--- Planning Research ---".to_string(),
                        format!("Generated {} search queries.", plan.len()),
                    ],
                )
            },
        )
        .await?;

        let mut findings: Vec<Finding> = Vec::new();
        let mut round = 0;
        let draft = loop {
            round += 1;
            for (index, query) in plan.iter().enumerate() {
                let source = self.search_url(query);
                if !findings.iter().any(|finding| finding.source == source) {
                    findings.push(Finding {
                        query: query.clone(),
                        source: source.clone(),
                    });
                }
                self.emit(
                    &updates,
                    StageUpdate {
                        sources: vec![source],
                        ..StageUpdate::new(
                            "researcher",
                            [format!(
                                "--- Researching Query {}/{}: {query} ---",
                                index + 1,
                                plan.len()
                            )],
                        )
                    },
                )
                .await?;
            }

            let draft = write_report(topic, &findings);
            self.emit(
                &updates,
                StageUpdate {
                    draft: Some(draft.clone()),
                    ..StageUpdate::new(
                        "writer",
                        ["--- Writing Draft ---".to_string(), "Draft generated.".to_string()],
                    )
                },
            )
            .await?;

            let score = critique_score(&findings, round);
            self.emit(
                &updates,
                StageUpdate::new(
                    "critique",
                    [
                        "--- Critiquing Draft ---".to_string(),
                        format!("Critique Score: {score}/100"),
                    ],
                ),
            )
            .await?;

            if score > PASSING_SCORE || round > self.max_critique_rounds {
                break draft;
            }
        };

        self.memory.remember(topic, &draft).await;
        self.emit(
            &updates,
            StageUpdate::new(
                "save_memory",
                [
                    "--- Saving to Memory ---".to_string(),
                    "Report saved to database.".to_string(),
                ],
            ),
        )
        .await?;
        info!(topic, rounds = round, "research report finalized");
        Ok(draft)
    }
}

fn plan_queries(topic: &str) -> Vec<String> {
    QUERY_ANGLES
        .iter()
        .map(|angle| format!("{topic} {angle}"))
        .collect()
}

/// Grows with distinct sources and with each revision round.
fn critique_score(findings: &[Finding], round: u32) -> u32 {
    let sources = u32::try_from(findings.len()).unwrap_or(u32::MAX);
    (40 + sources.saturating_mul(10) + round.saturating_sub(1) * 10).min(100)
}

fn write_report(topic: &str, findings: &[Finding]) -> String {
    let mut report = format!("# {topic}\n\n## Overview\n\n");
    report.push_str(&format!(
        "This report summarizes **{}** sources gathered on *{topic}*.\n\n## Findings\n\n",
        findings.len()
    ));
    for finding in findings {
        report.push_str(&format!(
            "### {}\n\n- Source: [{}]({})\n\n",
            finding.query, finding.query, finding.source
        ));
    }
    report.push_str("## References\n\n");
    for finding in findings {
        report.push_str(&format!("- <{}>\n\n", finding.source));
    }
    report
}

#[cfg(test)]
#[path = "tests/agent_tests.rs"]
mod tests;
