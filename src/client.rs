use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::ep_error::EpError;
use crate::log_debug;
use crate::types::{ProcessingStarted, ProjectDetails, Slide, SlidesResponse};

/// Supplies the bearer credential for backend calls. Session lifecycle is the
/// holder's business; the tracker only reads the current value.
pub trait TokenHolder: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// A token fixed at construction, e.g. read from `EVAL_PULSE_TOKEN`.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl TokenHolder for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        if self.0.trim().is_empty() {
            None
        } else {
            Some(self.0.clone())
        }
    }
}

/// Remote source of truth for a batch. Enables mocking in synchronizer tests.
pub trait StatusSource: Send + Sync {
    /// `GET projects/{id}/details`
    fn project_details(
        &self,
        project_id: &str,
    ) -> impl Future<Output = Result<ProjectDetails, EpError>> + Send;

    /// `POST projects/{id}/reset-submissions`
    fn reset_submissions(&self, project_id: &str)
        -> impl Future<Output = Result<(), EpError>> + Send;

    /// `POST projects/{id}/start-processing`
    fn start_processing(
        &self,
        project_id: &str,
    ) -> impl Future<Output = Result<ProcessingStarted, EpError>> + Send;

    /// `GET submissions/{id}/slides`
    fn submission_slides(
        &self,
        submission_id: &str,
    ) -> impl Future<Output = Result<Vec<Slide>, EpError>> + Send;
}

/// Re-evaluate a project: reset every submission, then queue processing again.
pub async fn reevaluate<S: StatusSource>(
    source: &S,
    project_id: &str,
) -> Result<ProcessingStarted, EpError> {
    source.reset_submissions(project_id).await?;
    source.start_processing(project_id).await
}

// --- HTTP implementation ---

/// `StatusSource` backed by the evaluation backend's REST API.
pub struct HttpStatusClient {
    http: reqwest::Client,
    base_url: String,
    token: Arc<dyn TokenHolder>,
}

impl HttpStatusClient {
    pub fn new(
        base_url: &str,
        token: Arc<dyn TokenHolder>,
        request_timeout: Duration,
    ) -> Result<Self, EpError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| EpError::FetchFailure(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn bearer(&self) -> Result<String, EpError> {
        self.token
            .bearer_token()
            .ok_or_else(|| EpError::FetchFailure("No access token available".to_string()))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, EpError> {
        let body = self.send_raw(request).await?;
        serde_json::from_str(&body).map_err(|e| EpError::MalformedResponse(e.to_string()))
    }

    /// Send with credentials and return the body of a 2xx response.
    async fn send_raw(&self, request: reqwest::RequestBuilder) -> Result<String, EpError> {
        let response = request.bearer_auth(self.bearer()?).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(EpError::FetchFailure(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_detail(&body)
            )));
        }
        Ok(body)
    }
}

/// Backend errors carry `{"detail": "..."}`; fall back to the raw body.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no response body".to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        })
}

impl StatusSource for HttpStatusClient {
    async fn project_details(&self, project_id: &str) -> Result<ProjectDetails, EpError> {
        log_debug!("[client] GET projects/{}/details", project_id);
        let url = self.url(&format!("projects/{}/details", project_id));
        self.send(self.http.get(url)).await
    }

    async fn reset_submissions(&self, project_id: &str) -> Result<(), EpError> {
        log_debug!("[client] POST projects/{}/reset-submissions", project_id);
        let url = self.url(&format!("projects/{}/reset-submissions", project_id));
        self.send_raw(self.http.post(url)).await.map(|_| ())
    }

    async fn start_processing(&self, project_id: &str) -> Result<ProcessingStarted, EpError> {
        log_debug!("[client] POST projects/{}/start-processing", project_id);
        let url = self.url(&format!("projects/{}/start-processing", project_id));
        self.send(self.http.post(url)).await
    }

    async fn submission_slides(&self, submission_id: &str) -> Result<Vec<Slide>, EpError> {
        log_debug!("[client] GET submissions/{}/slides", submission_id);
        let url = self.url(&format!("submissions/{}/slides", submission_id));
        let response: SlidesResponse = self.send(self.http.get(url)).await?;
        Ok(response.slides)
    }
}

// --- Mock implementation ---

/// Mock status source for synchronizer tests.
///
/// Each `project_details` call pops the next scripted result; once the script
/// runs out, the last successful payload is repeated. An optional delay holds
/// every fetch open so overlap can be observed.
pub struct MockStatusSource {
    details: Mutex<VecDeque<Result<ProjectDetails, EpError>>>,
    last_ok: Mutex<Option<ProjectDetails>>,
    slides: Mutex<Vec<Slide>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    resets: AtomicUsize,
    starts: AtomicUsize,
}

impl MockStatusSource {
    pub fn new(details: Vec<Result<ProjectDetails, EpError>>) -> Self {
        Self {
            details: Mutex::new(details.into()),
            last_ok: Mutex::new(None),
            slides: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_slides(mut self, slides: Vec<Slide>) -> Self {
        self.slides = Mutex::new(slides);
        self
    }

    /// Append more scripted results.
    pub fn push(&self, result: Result<ProjectDetails, EpError>) {
        if let Ok(mut queue) = self.details.lock() {
            queue.push_back(result);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of `project_details` calls open at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    fn next_details(&self) -> Result<ProjectDetails, EpError> {
        let scripted = self.details.lock().ok().and_then(|mut q| q.pop_front());
        match scripted {
            Some(Ok(details)) => {
                if let Ok(mut last) = self.last_ok.lock() {
                    *last = Some(details.clone());
                }
                Ok(details)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last_ok
                .lock()
                .ok()
                .and_then(|last| last.clone())
                .ok_or_else(|| {
                    EpError::FetchFailure("MockStatusSource: no more results in sequence".to_string())
                }),
        }
    }
}

impl StatusSource for MockStatusSource {
    async fn project_details(&self, _project_id: &str) -> Result<ProjectDetails, EpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let open = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(open, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self.next_details();

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn reset_submissions(&self, _project_id: &str) -> Result<(), EpError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start_processing(&self, project_id: &str) -> Result<ProcessingStarted, EpError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(ProcessingStarted {
            message: "Processing started".to_string(),
            project_id: project_id.to_string(),
            queued: 0,
        })
    }

    async fn submission_slides(&self, _submission_id: &str) -> Result<Vec<Slide>, EpError> {
        Ok(self.slides.lock().map(|s| s.clone()).unwrap_or_default())
    }
}
