use axum::{extract::Extension, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::ai_client::{parse_reply, ChatMessage, OpenAiClient};
use crate::error::{AppError, AppResult};
use crate::intent::{extract_search_intent, format_category, SearchIntent};
use crate::quota::QuotaGate;

/// How much conversation history is replayed to the AI provider.
const HISTORY_WINDOW: usize = 6;

/// Fallback category list for the system prompt when the catalog is empty
/// or unreadable.
const DEFAULT_CATEGORY_LIST: &str = "Electrician, Plumber, Carpenter, Painter, AC Repair, \
     Cleaning, Tutoring, Beauty, Mechanic, Legal, Medical, IT, Photography, Catering, \
     Event Planning, Pest Control";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub city: String,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub history: Option<Vec<ChatMessage>>,
    /// When set, skip the AI call and return search results only.
    #[serde(rename = "skipAI", default)]
    pub skip_ai: bool,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub message: String,
    #[serde(rename = "searchIntent", skip_serializing_if = "Option::is_none")]
    pub search_intent: Option<SearchIntent>,
    #[serde(rename = "matchedProfessionals")]
    pub matched_professionals: Option<Vec<Uuid>>,
    #[serde(rename = "limitReached")]
    pub limit_reached: bool,
    /// `-1` means unlimited (paid user).
    pub remaining: i32,
    #[serde(rename = "isPaid")]
    pub is_paid: bool,
}

/// key: chat-orchestrator -> quota gate + intent + AI composition
#[derive(Clone)]
pub struct ChatService {
    pool: PgPool,
    ai: OpenAiClient,
    quota: QuotaGate,
}

impl ChatService {
    pub fn new(pool: PgPool, ai: OpenAiClient, quota: QuotaGate) -> Self {
        Self { pool, ai, quota }
    }
}

pub async fn chat(
    Extension(service): Extension<ChatService>,
    Json(payload): Json<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    if payload.message.is_empty() {
        return Err(AppError::BadRequest("Message is required".to_string()));
    }

    let user_id = match payload.user_id.as_deref().filter(|raw| !raw.is_empty()) {
        Some(raw) => match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(user_id = raw, "unparseable user id on chat request");
                None
            }
        },
        None => None,
    };

    let status = service.quota.check(user_id).await;
    let limit_reached = !status.can_use;

    // Out of quota, or the caller only wants search results: answer from
    // the local keyword table without spending an AI call.
    if limit_reached || payload.skip_ai {
        let search_intent = extract_search_intent(&payload.message);
        let matched = match &search_intent {
            Some(intent) => {
                match_professionals(&service.pool, &payload.city, &intent.category).await
            }
            None => Vec::new(),
        };

        let message = if limit_reached {
            let follow_up = match &search_intent {
                Some(intent) => format!(
                    "Here are some {} professionals in {}.",
                    format_category(&intent.category),
                    payload.city
                ),
                None => "Browse the categories below or try a simple search.".to_string(),
            };
            format!(
                "You've reached your daily limit of {} AI chat requests. \
                 Don't worry! I can still help you find services. {} \
                 Upgrade to a paid plan for unlimited AI assistance!",
                service.quota.daily_limit(),
                follow_up
            )
        } else {
            format!("Here are some results for your search in {}.", payload.city)
        };

        return Ok(Json(ChatResponse {
            success: true,
            message,
            search_intent,
            matched_professionals: if matched.is_empty() { None } else { Some(matched) },
            limit_reached,
            remaining: status.remaining,
            is_paid: status.is_paid,
        }));
    }

    let category_list = active_category_list(&service.pool).await;
    let mut messages = vec![ChatMessage::new(
        "system",
        system_prompt(&payload.city, &category_list),
    )];
    if let Some(history) = &payload.history {
        let start = history.len().saturating_sub(HISTORY_WINDOW);
        messages.extend(history[start..].iter().cloned());
    }
    messages.push(ChatMessage::new("user", payload.message.clone()));

    let raw = service.ai.chat(&messages).await?;
    let reply = parse_reply(&raw);

    let matched = match &reply.search_intent {
        Some(intent) => match_professionals(&service.pool, &payload.city, &intent.category).await,
        None => Vec::new(),
    };

    // Quota is spent only now, after the AI call succeeded; a failed call
    // costs nothing.
    let mut remaining = status.remaining;
    if let Some(user_id) = user_id {
        if !status.is_paid {
            match service.quota.consume(user_id).await {
                Ok(_) => remaining = (remaining - 1).max(0),
                Err(err) => warn!(?err, %user_id, "failed to count AI usage"),
            }
        }
        log_chat(&service.pool, user_id, &payload.message, &reply.display_text, &matched).await;
    }

    Ok(Json(ChatResponse {
        success: true,
        message: reply.display_text,
        search_intent: reply.search_intent,
        matched_professionals: if matched.is_empty() { None } else { Some(matched) },
        limit_reached: false,
        remaining: if status.is_paid { -1 } else { remaining },
        is_paid: status.is_paid,
    }))
}

fn system_prompt(city: &str, category_list: &str) -> String {
    format!(
        "You are WeList AI, a helpful assistant for finding local services in {city}, India.\n\n\
         Your job is to:\n\
         1. Understand what service the user needs\n\
         2. Ask clarifying questions if needed\n\
         3. Help them find the right professional\n\n\
         Available service categories: {category_list}\n\n\
         Guidelines:\n\
         - Be friendly, helpful, and concise\n\
         - If user asks for a service, identify the category\n\
         - If unclear, ask one clarifying question\n\
         - Keep responses under 100 words\n\
         - Always be polite and professional\n\
         - If user greets you, greet back and ask how you can help find services\n\n\
         When you identify a service need, include this JSON at the end of your response:\n\
         [SEARCH_INTENT: {{\"category\": \"category-slug\", \"query\": \"user's original request\"}}]"
    )
}

async fn active_category_list(pool: &PgPool) -> String {
    let names: Result<Vec<String>, _> =
        sqlx::query_scalar("SELECT name FROM categories WHERE is_active = TRUE ORDER BY name")
            .fetch_all(pool)
            .await;
    match names {
        Ok(names) if !names.is_empty() => names.join(", "),
        Ok(_) => DEFAULT_CATEGORY_LIST.to_string(),
        Err(err) => {
            warn!(?err, "failed to load category catalog");
            DEFAULT_CATEGORY_LIST.to_string()
        }
    }
}

/// Available professionals in the city whose profession or service list
/// matches the category. Capped at 10.
async fn match_professionals(pool: &PgPool, city: &str, category: &str) -> Vec<Uuid> {
    let result: Result<Vec<Uuid>, _> = sqlx::query_scalar(
        r#"
        SELECT id
        FROM professionals
        WHERE city = $1
          AND is_available = TRUE
          AND (profession ILIKE '%' || $2 || '%' OR $2 = ANY(services))
        LIMIT 10
        "#,
    )
    .bind(city)
    .bind(category)
    .fetch_all(pool)
    .await;

    match result {
        Ok(ids) => ids,
        Err(err) => {
            warn!(?err, city, category, "professional match query failed");
            Vec::new()
        }
    }
}

/// Best-effort analytics trail; failures never reach the caller.
async fn log_chat(pool: &PgPool, user_id: Uuid, message: &str, reply: &str, matched: &[Uuid]) {
    let session_id = Uuid::new_v4();
    let matched: Option<Vec<Uuid>> = if matched.is_empty() {
        None
    } else {
        Some(matched.to_vec())
    };
    let result = sqlx::query(
        r#"
        INSERT INTO ai_chat_logs (user_id, session_id, role, content, matched_professionals)
        VALUES ($1, $2, 'user', $3, NULL),
               ($1, $2, 'assistant', $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(session_id)
    .bind(message)
    .bind(reply)
    .bind(matched)
    .execute(pool)
    .await;
    if let Err(err) = result {
        warn!(?err, %user_id, "failed to log chat session");
    }
}
