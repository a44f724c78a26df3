use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dialoguer::Input;
use futures_util::{stream, Stream};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::config::SyncConfig;
use crate::planner::MediaCandidate;
use crate::session::{Session, SessionStore};

/// A chat or channel as listed by the gateway. The stringified `id` names
/// the destination folder.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationRef {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
}

/// One message from the history stream, newest first.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageView {
    pub id: i64,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub media: Option<MediaInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaInfo {
    pub kind: String,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

impl MediaInfo {
    /// Storage extension for the downloaded file, from the MIME type when
    /// the gateway reports one, otherwise from the media kind.
    pub fn extension(&self) -> &str {
        match self.mime.as_deref() {
            Some("image/jpeg") => "jpg",
            Some("image/png") => "png",
            Some("image/gif") => "gif",
            Some("image/webp") => "webp",
            Some("video/mp4") => "mp4",
            Some("video/webm") => "webm",
            Some("audio/ogg") => "ogg",
            Some("audio/mpeg") => "mp3",
            _ => match self.kind.as_str() {
                "photo" => "jpg",
                "video" => "mp4",
                "voice" => "ogg",
                _ => "bin",
            },
        }
    }
}

impl MessageView {
    pub fn to_candidate(&self) -> MediaCandidate {
        let suggested_filename = match &self.media {
            Some(info) => format!("{}.{}", self.id, info.extension()),
            None => self.id.to_string(),
        };
        MediaCandidate {
            message_id: self.id,
            has_media: self.media.is_some(),
            suggested_filename,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl Profile {
    pub fn display_name(&self) -> &str {
        self.first_name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("(unknown)")
    }
}

#[derive(Serialize)]
struct SendCodeRequest<'a> {
    api_id: i32,
    api_hash: &'a str,
    phone: &'a str,
}

#[derive(Deserialize)]
struct SendCodeResponse {
    code_token: String,
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    code_token: &'a str,
    code: &'a str,
}

#[derive(Deserialize)]
struct SignInResponse {
    token: String,
    user: Profile,
}

/// What the sync driver needs from the platform: paged history and media
/// transfer. Split out so a pass can be exercised against an in-memory
/// source.
#[async_trait]
pub trait MediaSource {
    /// One page of messages older than `before_id` (or the newest page when
    /// `None`), ordered newest first. A short page ends the history.
    async fn fetch_page(
        &self,
        conversation_id: i64,
        before_id: Option<i64>,
        page_size: usize,
    ) -> Result<Vec<MessageView>>;

    /// Transfers the media payload of one message into `dest`, returning the
    /// number of bytes written.
    async fn fetch_media(&self, conversation_id: i64, message_id: i64, dest: &Path)
        -> Result<u64>;
}

/// Authenticated HTTP client for the platform gateway.
#[derive(Clone)]
pub struct PlatformClient {
    base_url: String,
    http: Client,
    token: String,
}

impl PlatformClient {
    /// Reuses the persisted session when the gateway still accepts it,
    /// otherwise runs the interactive code handshake and saves the result.
    pub async fn connect(config: &SyncConfig, sessions: &SessionStore) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build HTTP client")?;

        if let Some(session) = sessions.load(&config.session_name)? {
            let client = Self {
                base_url: config.base_url.clone(),
                http: http.clone(),
                token: session.token,
            };
            match client.me().await {
                Ok(profile) => {
                    tracing::debug!(user_id = profile.id, "reusing saved session");
                    return Ok(client);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "saved session rejected, re-authenticating");
                }
            }
        }

        let (token, user, phone) = authenticate(config, &http).await?;
        sessions.save(
            &config.session_name,
            &Session {
                token: token.clone(),
                user_id: user.id,
                phone,
                created_at: Utc::now().to_rfc3339(),
            },
        )?;
        Ok(Self {
            base_url: config.base_url.clone(),
            http,
            token,
        })
    }

    pub async fn me(&self) -> Result<Profile> {
        self.get_json("me", &[]).await
    }

    pub async fn list_dialogs(&self) -> Result<Vec<ConversationRef>> {
        self.get_json("dialogs", &[]).await
    }

    /// Resolves a numeric id or username into a conversation.
    pub async fn resolve_target(&self, selector: &str) -> Result<ConversationRef> {
        self.get_json(&format!("dialogs/{selector}"), &[])
            .await
            .with_context(|| format!("failed to resolve conversation '{selector}'"))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(path);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("gateway returned {status} for {url}: {body}");
        }
        response
            .json()
            .await
            .with_context(|| format!("failed to decode response from {url}"))
    }
}

#[async_trait]
impl MediaSource for PlatformClient {
    async fn fetch_page(
        &self,
        conversation_id: i64,
        before_id: Option<i64>,
        page_size: usize,
    ) -> Result<Vec<MessageView>> {
        let mut query = vec![("page_size", page_size.to_string())];
        if let Some(before_id) = before_id {
            query.push(("before_id", before_id.to_string()));
        }
        self.get_json(&format!("conversations/{conversation_id}/messages"), &query)
            .await
    }

    async fn fetch_media(
        &self,
        conversation_id: i64,
        message_id: i64,
        dest: &Path,
    ) -> Result<u64> {
        let url = self.url(&format!(
            "conversations/{conversation_id}/messages/{message_id}/media"
        ));
        let mut response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("media request to {url} failed"))?;

        // Rate limited: honor the advertised wait once, then retry.
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let wait = retry_after_seconds(&response).unwrap_or(30);
            tracing::warn!(message_id, seconds = wait, "rate limit reached, waiting");
            sleep(Duration::from_secs(wait)).await;
            response = self
                .http
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await
                .with_context(|| format!("media retry to {url} failed"))?;
        }
        if !response.status().is_success() {
            anyhow::bail!("gateway returned {} for {url}", response.status());
        }

        let bytes = response
            .bytes()
            .await
            .context("failed to read media bytes")?;
        tokio::fs::write(dest, &bytes)
            .await
            .with_context(|| format!("failed to write {}", dest.display()))?;
        Ok(bytes.len() as u64)
    }
}

/// Lazy, single-pass stream over a conversation's history, pulling one page
/// at a time so a scan limit can stop early without materializing anything.
pub fn message_stream<S>(
    source: &S,
    conversation_id: i64,
    page_size: usize,
) -> impl Stream<Item = Result<MessageView>> + '_
where
    S: MediaSource + ?Sized,
{
    struct PageState {
        before_id: Option<i64>,
        buffered: VecDeque<MessageView>,
        exhausted: bool,
    }

    let state = PageState {
        before_id: None,
        buffered: VecDeque::new(),
        exhausted: false,
    };
    stream::try_unfold(state, move |mut state| async move {
        loop {
            if let Some(message) = state.buffered.pop_front() {
                return Ok(Some((message, state)));
            }
            if state.exhausted {
                return Ok(None);
            }
            let page = source
                .fetch_page(conversation_id, state.before_id, page_size)
                .await?;
            if page.len() < page_size {
                state.exhausted = true;
            }
            match page.last() {
                Some(last) => state.before_id = Some(last.id),
                None => state.exhausted = true,
            }
            state.buffered = page.into();
        }
    })
}

async fn authenticate(config: &SyncConfig, http: &Client) -> Result<(String, Profile, String)> {
    let base = config.base_url.trim_end_matches('/');
    let phone: String = Input::new()
        .with_prompt("Phone number (international format)")
        .interact_text()
        .context("phone prompt failed")?;

    let url = format!("{base}/auth/send-code");
    let response = http
        .post(&url)
        .json(&SendCodeRequest {
            api_id: config.api_id,
            api_hash: &config.api_hash,
            phone: &phone,
        })
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;
    if !response.status().is_success() {
        anyhow::bail!("gateway refused the code request: {}", response.status());
    }
    let sent: SendCodeResponse = response
        .json()
        .await
        .context("failed to decode code response")?;

    let code: String = Input::new()
        .with_prompt("Enter the authentication code")
        .interact_text()
        .context("code prompt failed")?;

    let url = format!("{base}/auth/sign-in");
    let response = http
        .post(&url)
        .json(&SignInRequest {
            code_token: &sent.code_token,
            code: code.trim(),
        })
        .send()
        .await
        .with_context(|| format!("request to {url} failed"))?;
    if !response.status().is_success() {
        anyhow::bail!("sign-in rejected: {}", response.status());
    }
    let signed: SignInResponse = response
        .json()
        .await
        .context("failed to decode sign-in response")?;
    Ok((signed.token, signed.user, phone))
}

fn retry_after_seconds(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn message(id: i64, media: Option<MediaInfo>) -> MessageView {
        MessageView {
            id,
            date: Utc::now(),
            media,
        }
    }

    fn photo() -> MediaInfo {
        MediaInfo {
            kind: "photo".into(),
            mime: Some("image/jpeg".into()),
            size_bytes: Some(1024),
        }
    }

    #[test]
    fn filename_comes_from_id_and_extension() {
        let candidate = message(17, Some(photo())).to_candidate();
        assert!(candidate.has_media);
        assert_eq!(candidate.suggested_filename, "17.jpg");

        let bare = message(18, None).to_candidate();
        assert!(!bare.has_media);
        assert_eq!(bare.suggested_filename, "18");
    }

    #[test]
    fn extension_falls_back_to_kind() {
        let info = MediaInfo {
            kind: "voice".into(),
            mime: None,
            size_bytes: None,
        };
        assert_eq!(info.extension(), "ogg");
        let unknown = MediaInfo {
            kind: "sticker".into(),
            mime: Some("application/x-custom".into()),
            size_bytes: None,
        };
        assert_eq!(unknown.extension(), "bin");
    }

    struct PagedSource {
        ids: Vec<i64>,
    }

    #[async_trait]
    impl MediaSource for PagedSource {
        async fn fetch_page(
            &self,
            _conversation_id: i64,
            before_id: Option<i64>,
            page_size: usize,
        ) -> Result<Vec<MessageView>> {
            // ids are held newest first, mirroring the gateway ordering
            Ok(self
                .ids
                .iter()
                .copied()
                .filter(|id| before_id.map(|b| *id < b).unwrap_or(true))
                .take(page_size)
                .map(|id| message(id, None))
                .collect())
        }

        async fn fetch_media(
            &self,
            _conversation_id: i64,
            _message_id: i64,
            _dest: &Path,
        ) -> Result<u64> {
            unreachable!("paging test never transfers")
        }
    }

    #[tokio::test]
    async fn stream_walks_pages_in_order() {
        let source = PagedSource {
            ids: vec![50, 40, 30, 20, 10],
        };
        let ids: Vec<i64> = message_stream(&source, 1, 2)
            .map(|item| item.expect("page").id)
            .collect()
            .await;
        assert_eq!(ids, vec![50, 40, 30, 20, 10]);
    }

    #[tokio::test]
    async fn empty_history_yields_nothing() {
        let source = PagedSource { ids: vec![] };
        let ids: Vec<i64> = message_stream(&source, 1, 2)
            .map(|item| item.expect("page").id)
            .collect()
            .await;
        assert!(ids.is_empty());
    }
}
