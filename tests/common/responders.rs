//! Stateful wiremock responders for the ranged download and resumable upload protocols

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use wiremock::{Request, Respond, ResponseTemplate};

fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request.headers.get(name).and_then(|v| v.to_str().ok())
}

/// Serves `alt=media` downloads, honouring `Range: bytes=a-b`
pub struct RangeResponder {
    pub data: Vec<u8>,
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let len = self.data.len() as u64;
        let Some(range) = header(request, "range").and_then(|r| r.strip_prefix("bytes=")) else {
            return ResponseTemplate::new(200).set_body_bytes(self.data.clone());
        };
        let Some((start, end)) = range.split_once('-') else {
            return ResponseTemplate::new(400);
        };
        let start: u64 = start.parse().unwrap();
        let end: u64 = end.parse().unwrap();
        if start >= len {
            return ResponseTemplate::new(416).insert_header("Content-Range", format!("bytes */{len}"));
        }
        let end = end.min(len - 1);
        ResponseTemplate::new(206)
            .insert_header("Content-Range", format!("bytes {start}-{end}/{len}"))
            .set_body_bytes(self.data[start as usize..=end as usize].to_vec())
    }
}

/// Plays the YouTube side of a resumable upload session
///
/// The first `fail_first` chunk requests are answered with 503 without persisting
/// anything.
#[derive(Clone)]
pub struct ResumableSession {
    pub received: Arc<Mutex<Vec<u8>>>,
    pub chunk_requests: Arc<AtomicU32>,
    pub fail_first: u32,
    pub video_id: String,
}

impl ResumableSession {
    pub fn new(fail_first: u32) -> Self {
        Self {
            received: Arc::new(Mutex::new(Vec::new())),
            chunk_requests: Arc::new(AtomicU32::new(0)),
            fail_first,
            video_id: "vid123".into(),
        }
    }

    pub fn received(&self) -> Vec<u8> {
        self.received.lock().unwrap().clone()
    }

    fn progress(&self, persisted: usize, total: usize) -> ResponseTemplate {
        if persisted == total {
            return ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "kind": "youtube#video",
                "id": self.video_id,
                "status": {"uploadStatus": "uploaded"}
            }));
        }
        let template = ResponseTemplate::new(308);
        if persisted == 0 {
            template
        } else {
            template.insert_header("Range", format!("bytes=0-{}", persisted - 1))
        }
    }
}

impl Respond for ResumableSession {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Some(content_range) = header(request, "content-range") else {
            return ResponseTemplate::new(400);
        };
        let spec = content_range.trim_start_matches("bytes ").to_string();
        let Some((range, total)) = spec.split_once('/') else {
            return ResponseTemplate::new(400);
        };
        let total: usize = total.parse().unwrap();

        // Status query
        if range == "*" {
            let persisted = self.received.lock().unwrap().len();
            return self.progress(persisted, total);
        }

        let n = self.chunk_requests.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            return ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": {"code": 503, "message": "Backend Error",
                          "errors": [{"reason": "backendError"}]}
            }));
        }

        let (start, _) = range.split_once('-').unwrap();
        let start: usize = start.parse().unwrap();
        let mut received = self.received.lock().unwrap();
        if start != received.len() {
            return ResponseTemplate::new(400);
        }
        received.extend_from_slice(&request.body);
        let persisted = received.len();
        drop(received);
        self.progress(persisted, total)
    }
}
