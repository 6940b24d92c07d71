//! Email analyzer.
//!
//! Source files are normalised into header/body records before prompting:
//! `.eml` holds one message, `.mbox` many, and `.msg` is unsupported
//! without an external parser (a structured dependency failure, never a
//! crash). Threads are sorted by parsed date ascending; date ties are
//! broken by reply depth resolved through the In-Reply-To and References
//! headers, and positions are numbered from 0.

use crate::prompts;
use crate::{AnalyzeError, AnalyzeResult, AnalyzerOptions, FoldedFailure, persist};
use chrono::{DateTime, Utc};
use evidentia_core::{
    CoreError, EmailThreadAnalysis, EvidenceType, SCHEMA_VERSION, UnifiedAnalysis, round4,
};
use evidentia_llm::{LlmProvider, StructuredRequest, call_with_retry};
use evidentia_store::EvidenceStore;
use mailparse::MailHeaderMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One normalised email ready for prompting.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEmail {
    pub headers: BTreeMap<String, String>,
    pub date: Option<DateTime<Utc>>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub body: String,
    pub attachments: Vec<String>,
}

/// Analyzer for email evidence.
pub struct EmailAnalyzer<P> {
    store: Arc<EvidenceStore>,
    provider: Option<Arc<P>>,
    options: AnalyzerOptions,
}

impl<P: LlmProvider + 'static> EmailAnalyzer<P> {
    pub fn new(store: Arc<EvidenceStore>, provider: Option<Arc<P>>, options: AnalyzerOptions) -> Self {
        Self {
            store,
            provider,
            options,
        }
    }

    /// Analyzes one ingested email file and persists the result.
    pub async fn analyze(
        &self,
        sha256: &str,
        cancel: &CancellationToken,
    ) -> AnalyzeResult<UnifiedAnalysis> {
        let metadata = self.store.get_metadata(sha256)?;
        let bytes = self.store.read_original(sha256)?;

        let (analysis, headers, notes, failure) =
            match parse_email_source(&bytes, &metadata.extension) {
                Ok(emails) if !emails.is_empty() => {
                    let emails = sort_thread(emails);
                    let headers = primary_headers(&emails);
                    let (analysis, notes, failure) =
                        self.structured_or_fallback(&emails, cancel).await?;
                    (analysis, Some(headers), notes, failure)
                }
                Ok(_) => (
                    EmailThreadAnalysis::fallback("source contained no parseable messages"),
                    None,
                    Some("source contained no parseable messages".to_string()),
                    Some(FoldedFailure::DependencyMissing),
                ),
                Err(AnalyzeError::DependencyMissing(message)) => (
                    EmailThreadAnalysis::fallback(message.clone()),
                    None,
                    Some(message),
                    Some(FoldedFailure::DependencyMissing),
                ),
                Err(other) => return Err(other),
            };

        let unified = UnifiedAnalysis {
            schema_version: SCHEMA_VERSION.to_string(),
            evidence_type: EvidenceType::Email,
            analysis_timestamp: Utc::now(),
            file_metadata: metadata,
            case_ids: self.store.cases_of(sha256)?,
            case_id: None,
            document_analysis: None,
            image_analysis: None,
            email_analysis: Some(analysis),
            chain_of_custody: self.store.read_custody(sha256)?,
            exif_data: None,
            email_headers: headers,
            labels: Vec::new(),
            notes,
            extra: BTreeMap::new(),
        };

        persist(&self.store, sha256, &unified, &self.options.actor, failure)?;
        info!(sha256, "email analysis complete");
        self.store.get_analysis(sha256)?.ok_or_else(|| {
            AnalyzeError::Internal("analysis missing immediately after save".to_string())
        })
    }

    async fn structured_or_fallback(
        &self,
        emails: &[ParsedEmail],
        cancel: &CancellationToken,
    ) -> AnalyzeResult<(EmailThreadAnalysis, Option<String>, Option<FoldedFailure>)> {
        let Some(provider) = &self.provider else {
            return Ok((
                EmailThreadAnalysis::fallback("no LLM configured"),
                Some("email analysis skipped: no LLM configured".to_string()),
                Some(FoldedFailure::Unavailable),
            ));
        };

        let digest = thread_digest(emails);
        let prompt = prompts::email_prompt(self.options.case_type, &digest);
        let request = StructuredRequest::deterministic(
            &self.options.model,
            &prompt,
            "email_thread_analysis",
            prompts::email_schema(),
        );

        let outcome = call_with_retry(provider.as_ref(), &request, &self.options.llm, cancel)
            .await
            .and_then(|response| response.into_parsed::<EmailThreadAnalysis>());

        match outcome {
            Ok(mut analysis) => {
                if analysis.sentiment_progression.len() != emails.len() {
                    return Err(AnalyzeError::Schema(CoreError::validation(
                        "email_analysis.sentiment_progression",
                        format!(
                            "expected {} entries (one per email), got {}",
                            emails.len(),
                            analysis.sentiment_progression.len()
                        ),
                    )));
                }
                round_email(&mut analysis);
                Ok((analysis, None, None))
            }
            Err(err) => {
                let (folded, message) = FoldedFailure::from_llm(err)?;
                warn!(%message, kind = folded.kind(), "email analysis folded");
                Ok((
                    EmailThreadAnalysis::fallback(format!(
                        "analysis failed ({}): {message}",
                        folded.kind()
                    )),
                    Some(format!("email analysis failed ({}): {message}", folded.kind())),
                    Some(folded),
                ))
            }
        }
    }
}

fn round_email(analysis: &mut EmailThreadAnalysis) {
    analysis.confidence_overall = round4(analysis.confidence_overall);
    for value in &mut analysis.sentiment_progression {
        *value = round4(*value);
    }
    for participant in &mut analysis.participants {
        participant.confidence = round4(participant.confidence);
        participant.deference_score = round4(participant.deference_score);
    }
    for event in &mut analysis.escalation_events {
        event.confidence = round4(event.confidence);
    }
}

/// Parses an email source file into individual messages.
pub fn parse_email_source(bytes: &[u8], extension: &str) -> AnalyzeResult<Vec<ParsedEmail>> {
    match extension {
        "eml" => Ok(vec![parse_single(bytes)?]),
        "mbox" => split_mbox(bytes).iter().map(|m| parse_single(m)).collect(),
        "msg" => Err(AnalyzeError::DependencyMissing(
            "no .msg parser available; convert to .eml for analysis".to_string(),
        )),
        other => Err(AnalyzeError::Internal(format!(
            "unsupported email extension `{other}`"
        ))),
    }
}

fn parse_single(bytes: &[u8]) -> AnalyzeResult<ParsedEmail> {
    let mail = mailparse::parse_mail(bytes)
        .map_err(|e| AnalyzeError::Internal(format!("email parse failed: {e}")))?;

    let mut headers = BTreeMap::new();
    for name in ["From", "To", "Cc", "Bcc", "Subject", "Date", "Message-ID"] {
        if let Some(value) = mail.headers.get_first_value(name) {
            headers.insert(name.to_string(), value);
        }
    }

    let date = mail
        .headers
        .get_first_value("Date")
        .and_then(|raw| mailparse::dateparse(&raw).ok())
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    let message_id = mail
        .headers
        .get_first_value("Message-ID")
        .map(|v| v.trim().to_string());
    let in_reply_to = mail
        .headers
        .get_first_value("In-Reply-To")
        .map(|v| v.trim().to_string());
    let references = mail
        .headers
        .get_first_value("References")
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();

    let (body, attachments) = extract_body(&mail)?;

    Ok(ParsedEmail {
        headers,
        date,
        message_id,
        in_reply_to,
        references,
        body,
        attachments,
    })
}

/// Plain text preferred; HTML stripped when it is all there is.
fn extract_body(mail: &mailparse::ParsedMail<'_>) -> AnalyzeResult<(String, Vec<String>)> {
    let mut plain = None;
    let mut html = None;
    let mut attachments = Vec::new();

    collect_parts(mail, &mut plain, &mut html, &mut attachments)?;

    let body = match (plain, html) {
        (Some(text), _) => text,
        (None, Some(markup)) => strip_html(&markup),
        (None, None) => String::new(),
    };
    Ok((body, attachments))
}

fn collect_parts(
    part: &mailparse::ParsedMail<'_>,
    plain: &mut Option<String>,
    html: &mut Option<String>,
    attachments: &mut Vec<String>,
) -> AnalyzeResult<()> {
    let disposition = part.get_content_disposition();
    if disposition.disposition == mailparse::DispositionType::Attachment {
        if let Some(filename) = disposition.params.get("filename") {
            attachments.push(filename.clone());
        }
        return Ok(());
    }

    if part.subparts.is_empty() {
        let body = part
            .get_body()
            .map_err(|e| AnalyzeError::Internal(format!("email body decode failed: {e}")))?;
        match part.ctype.mimetype.as_str() {
            "text/plain" => {
                if plain.is_none() {
                    *plain = Some(body);
                }
            }
            "text/html" => {
                if html.is_none() {
                    *html = Some(body);
                }
            }
            _ => {}
        }
        return Ok(());
    }

    for sub in &part.subparts {
        collect_parts(sub, plain, html, attachments)?;
    }
    Ok(())
}

static TAG_RE: OnceLock<regex::Regex> = OnceLock::new();

fn strip_html(markup: &str) -> String {
    let re = TAG_RE.get_or_init(|| regex::Regex::new("<[^>]*>").expect("static pattern"));
    let stripped = re.replace_all(markup, " ");
    stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits an mbox file on its `From ` separator lines.
fn split_mbox(bytes: &[u8]) -> Vec<Vec<u8>> {
    let text = String::from_utf8_lossy(bytes);
    let mut messages: Vec<Vec<u8>> = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.starts_with("From ") {
            if !current.trim().is_empty() {
                messages.push(current.clone().into_bytes());
            }
            current.clear();
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        messages.push(current.into_bytes());
    }
    messages
}

/// Date ascending; ties are broken by reply depth so a reply always
/// follows the message it answers, then Message-ID for full determinism.
///
/// Depth is resolved by walking In-Reply-To links through the thread's
/// Message-IDs; an unresolvable chain still counts the ancestors listed
/// in References.
pub fn sort_thread(emails: Vec<ParsedEmail>) -> Vec<ParsedEmail> {
    let parents: BTreeMap<String, Option<String>> = emails
        .iter()
        .filter_map(|e| e.message_id.clone().map(|id| (id, e.in_reply_to.clone())))
        .collect();

    let mut keyed: Vec<(usize, ParsedEmail)> = emails
        .into_iter()
        .map(|email| (reply_depth(&email, &parents), email))
        .collect();
    keyed.sort_by(|a, b| {
        a.1.date
            .cmp(&b.1.date)
            .then_with(|| a.0.cmp(&b.0))
            .then_with(|| a.1.message_id.cmp(&b.1.message_id))
    });
    keyed.into_iter().map(|(_, email)| email).collect()
}

/// Number of ancestors above an email in its reply chain.
fn reply_depth(email: &ParsedEmail, parents: &BTreeMap<String, Option<String>>) -> usize {
    let mut depth = 0;
    let mut current = email.in_reply_to.clone();
    // The hop bound guards against Message-ID cycles in malformed mail.
    let mut hops = parents.len() + 1;
    while let Some(parent_id) = current {
        depth += 1;
        hops -= 1;
        if hops == 0 {
            break;
        }
        current = parents.get(&parent_id).cloned().flatten();
    }
    depth.max(email.references.len())
}

fn primary_headers(emails: &[ParsedEmail]) -> BTreeMap<String, String> {
    emails.first().map(|e| e.headers.clone()).unwrap_or_default()
}

/// The numbered thread digest fed to the prompt.
pub fn thread_digest(emails: &[ParsedEmail]) -> String {
    let mut digest = String::new();
    for (position, email) in emails.iter().enumerate() {
        digest.push_str(&format!("Email {position}\n"));
        for name in ["From", "To", "Cc", "Date", "Subject"] {
            if let Some(value) = email.headers.get(name) {
                digest.push_str(&format!("{name}: {value}\n"));
            }
        }
        if !email.attachments.is_empty() {
            digest.push_str(&format!("Attachments: {}\n", email.attachments.join(", ")));
        }
        digest.push('\n');
        digest.push_str(&email.body);
        digest.push_str("\n---\n");
    }
    digest
}

#[cfg(test)]
mod tests {
    use super::*;
    use evidentia_llm::MockProvider;
    use std::fs;
    use std::path::Path;

    const SAMPLE_EML: &str = "From: sarah.johnson@example.com\r\n\
To: mark.webb@example.com\r\n\
Subject: Meeting cancelled\r\n\
Date: Fri, 15 Mar 2024 09:30:00 +0000\r\n\
Message-ID: <one@example.com>\r\n\
Content-Type: text/plain\r\n\
\r\n\
The HR meeting is cancelled.\r\n";

    #[test]
    fn test_parse_eml() {
        let emails = parse_email_source(SAMPLE_EML.as_bytes(), "eml").unwrap();
        assert_eq!(emails.len(), 1);
        let email = &emails[0];
        assert_eq!(email.headers["Subject"], "Meeting cancelled");
        assert!(email.body.contains("HR meeting is cancelled"));
        assert!(email.date.is_some());
        assert_eq!(email.message_id.as_deref(), Some("<one@example.com>"));
    }

    #[test]
    fn test_msg_is_structured_dependency_error() {
        let err = parse_email_source(b"whatever", "msg").unwrap_err();
        assert!(matches!(err, AnalyzeError::DependencyMissing(_)));
    }

    #[test]
    fn test_mbox_split() {
        let mbox = format!(
            "From sarah Fri Mar 15 09:30:00 2024\n{SAMPLE_EML}\nFrom mark Fri Mar 15 10:00:00 2024\n{SAMPLE_EML}"
        );
        let messages = split_mbox(mbox.as_bytes());
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_thread_sorting() {
        let mut first = parse_single(SAMPLE_EML.as_bytes()).unwrap();
        first.date = Some(DateTime::from_timestamp(1_000, 0).unwrap());
        first.references = vec![];
        first.message_id = Some("<a>".to_string());

        let mut reply = first.clone();
        reply.date = Some(DateTime::from_timestamp(1_000, 0).unwrap());
        reply.references = vec!["<a>".to_string()];
        reply.message_id = Some("<b>".to_string());

        let mut later = first.clone();
        later.date = Some(DateTime::from_timestamp(2_000, 0).unwrap());
        later.message_id = Some("<c>".to_string());

        let sorted = sort_thread(vec![later.clone(), reply.clone(), first.clone()]);
        assert_eq!(sorted[0].message_id.as_deref(), Some("<a>"));
        assert_eq!(sorted[1].message_id.as_deref(), Some("<b>"));
        assert_eq!(sorted[2].message_id.as_deref(), Some("<c>"));
    }

    #[test]
    fn test_in_reply_to_breaks_date_ties() {
        let mut parent = parse_single(SAMPLE_EML.as_bytes()).unwrap();
        parent.date = Some(DateTime::from_timestamp(1_000, 0).unwrap());
        parent.in_reply_to = None;
        parent.references = vec![];
        parent.message_id = Some("<a>".to_string());

        // Same Date header, no References; only In-Reply-To orders them.
        let mut reply = parent.clone();
        reply.in_reply_to = Some("<a>".to_string());
        reply.message_id = Some("<b>".to_string());

        let sorted = sort_thread(vec![reply.clone(), parent.clone()]);
        assert_eq!(sorted[0].message_id.as_deref(), Some("<a>"));
        assert_eq!(sorted[1].message_id.as_deref(), Some("<b>"));
    }

    #[test]
    fn test_reply_chain_depth_orders_same_date_thread() {
        let mut root = parse_single(SAMPLE_EML.as_bytes()).unwrap();
        root.date = Some(DateTime::from_timestamp(1_000, 0).unwrap());
        root.in_reply_to = None;
        root.references = vec![];
        root.message_id = Some("<a>".to_string());

        let mut child = root.clone();
        child.in_reply_to = Some("<a>".to_string());
        child.message_id = Some("<b>".to_string());

        let mut grandchild = root.clone();
        grandchild.in_reply_to = Some("<b>".to_string());
        grandchild.message_id = Some("<c>".to_string());

        // The grandchild's chain resolves two ancestors deep even though
        // it carries no References header.
        let sorted = sort_thread(vec![grandchild, root, child]);
        let ids: Vec<_> = sorted.iter().map(|e| e.message_id.as_deref().unwrap()).collect();
        assert_eq!(ids, vec!["<a>", "<b>", "<c>"]);
    }

    #[test]
    fn test_strip_html() {
        let text = strip_html("<p>Hello&nbsp;<b>world</b> &amp; co</p>");
        assert_eq!(text, "Hello world & co");
    }

    #[test]
    fn test_thread_digest_numbers_from_zero() {
        let email = parse_single(SAMPLE_EML.as_bytes()).unwrap();
        let digest = thread_digest(&[email.clone(), email]);
        assert!(digest.contains("Email 0"));
        assert!(digest.contains("Email 1"));
    }

    fn thread_json(sentiments: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "thread_summary": "Short scheduling exchange.",
            "participants": [{
                "email_address": "sarah.johnson@example.com",
                "display_name": "Sarah Johnson",
                "role": "sender",
                "authority_level": "management",
                "confidence": 0.9,
                "message_count": 1,
                "deference_score": 0.3,
                "dominant_topics": ["scheduling"]
            }],
            "communication_pattern": "professional",
            "sentiment_progression": sentiments,
            "escalation_events": [],
            "legal_significance": "low",
            "risk_flags": [],
            "timeline_reconstruction": ["Meeting cancelled on 15 March"],
            "confidence_overall": 0.87
        })
    }

    fn ingested_eml(dir: &Path) -> (Arc<EvidenceStore>, String) {
        let store = Arc::new(EvidenceStore::open(dir.join("store")).unwrap());
        let file = dir.join("thread.eml");
        fs::write(&file, SAMPLE_EML).unwrap();
        let result = store.ingest(&file, "CASE-1", "analyst").unwrap();
        (store, result.sha256)
    }

    #[tokio::test]
    async fn test_email_analysis_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let (store, hash) = ingested_eml(dir.path());

        let provider = Arc::new(
            MockProvider::new().with_json("email thread", thread_json(serde_json::json!([0.1]))),
        );
        let analyzer = EmailAnalyzer::new(
            Arc::clone(&store),
            Some(provider),
            AnalyzerOptions::default(),
        );

        let unified = analyzer
            .analyze(&hash, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(unified.evidence_type, EvidenceType::Email);
        let email = unified.email_analysis.as_ref().unwrap();
        assert_eq!(email.sentiment_progression.len(), 1);
        assert_eq!(
            unified.email_headers.as_ref().unwrap()["Subject"],
            "Meeting cancelled"
        );
    }

    #[tokio::test]
    async fn test_sentiment_length_mismatch_is_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let (store, hash) = ingested_eml(dir.path());

        // Two sentiment entries for a one-email thread.
        let provider = Arc::new(
            MockProvider::new()
                .with_json("email thread", thread_json(serde_json::json!([0.1, 0.5]))),
        );
        let analyzer = EmailAnalyzer::new(
            Arc::clone(&store),
            Some(provider),
            AnalyzerOptions::default(),
        );

        let err = analyzer
            .analyze(&hash, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzeError::Schema(_)));
    }

    #[tokio::test]
    async fn test_msg_evidence_folds_to_partial_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(EvidenceStore::open(dir.path().join("store")).unwrap());
        let file = dir.path().join("legacy.msg");
        fs::write(&file, b"outlook binary blob").unwrap();
        let hash = store.ingest(&file, "CASE-1", "analyst").unwrap().sha256;

        let analyzer: EmailAnalyzer<MockProvider> =
            EmailAnalyzer::new(Arc::clone(&store), None, AnalyzerOptions::default());

        let unified = analyzer
            .analyze(&hash, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(unified.confidence(), 0.0);
        assert!(unified.notes.as_ref().unwrap().contains(".msg"));

        let custody = store.read_custody(&hash).unwrap();
        let analyze_event = custody
            .iter()
            .find(|e| e.event_type == evidentia_core::CustodyEventType::Analyze)
            .unwrap();
        assert_eq!(
            analyze_event.metadata_str("error_kind"),
            Some("dependency_missing")
        );
    }
}
