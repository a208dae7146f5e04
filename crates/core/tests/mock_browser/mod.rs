// In-process Chromium stand-in: serves /json/version over HTTP and speaks
// just enough CDP over a WebSocket on the same port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

pub const EXTENSION_ID: &str = "abcdefghijklmnopabcdefghijklmnop";

#[derive(Debug, Clone)]
pub struct MockTarget {
	pub id: String,
	pub kind: String,
	pub url: String,
}

#[derive(Default)]
pub struct MockState {
	pub targets: Vec<MockTarget>,
	/// (session id, target id)
	pub sessions: Vec<(String, String)>,
	/// Every method received, in order.
	pub calls: Vec<String>,
	/// Every expression evaluated, with the target it ran on.
	pub evaluations: Vec<(String, String)>,
	/// Manifest reported by the extension's service worker.
	pub extension_manifest: Option<(String, String)>,
	pub native_reload: bool,
	/// Returned for the baseline extraction script.
	pub document: Option<String>,
	pub baseline_script: String,
	/// Sessions the browser has forgotten; commands on them fail.
	pub stale_sessions: Vec<String>,
	pub next_target: usize,
}

pub struct MockBrowser {
	pub addr: SocketAddr,
	pub state: Arc<Mutex<MockState>>,
	events: broadcast::Sender<Value>,
	task: JoinHandle<()>,
}

impl MockBrowser {
	pub async fn start() -> Self {
		Self::with_state(MockState::default()).await
	}

	pub async fn with_state(state: MockState) -> Self {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let state = Arc::new(Mutex::new(state));
		let (events, _) = broadcast::channel(64);

		let task = tokio::spawn({
			let state = Arc::clone(&state);
			let events = events.clone();
			async move {
				while let Ok((stream, _)) = listener.accept().await {
					tokio::spawn(serve(stream, addr, Arc::clone(&state), events.subscribe()));
				}
			}
		});

		Self { addr, state, events, task }
	}

	pub fn port(&self) -> u16 {
		self.addr.port()
	}

	pub fn ws_url(&self) -> String {
		format!("ws://{}/devtools/browser/mock", self.addr)
	}

	pub fn add_target(&self, kind: &str, url: &str) -> String {
		let mut state = self.state.lock();
		state.next_target += 1;
		let id = format!("{kind}-{}", state.next_target);
		state.targets.push(MockTarget {
			id: id.clone(),
			kind: kind.to_string(),
			url: url.to_string(),
		});
		id
	}

	/// Latest session attached to `target_id`.
	pub fn session_for(&self, target_id: &str) -> Option<String> {
		self.state
			.lock()
			.sessions
			.iter()
			.rev()
			.find(|(_, target)| target == target_id)
			.map(|(session, _)| session.clone())
	}

	/// Makes the browser forget `session_id`.
	pub fn expire_session(&self, session_id: &str) {
		self.state.lock().stale_sessions.push(session_id.to_string());
	}

	/// Session ids attached to `target_id`, oldest first.
	pub fn sessions_of(&self, target_id: &str) -> Vec<String> {
		self.state
			.lock()
			.sessions
			.iter()
			.filter(|(_, target)| target == target_id)
			.map(|(session, _)| session.clone())
			.collect()
	}

	pub fn count_calls(&self, method: &str) -> usize {
		self.state.lock().calls.iter().filter(|m| *m == method).count()
	}

	/// Pushes an unsolicited event to every connected client.
	pub fn emit(&self, event: Value) {
		let _ = self.events.send(event);
	}
}

impl Drop for MockBrowser {
	fn drop(&mut self) {
		self.task.abort();
	}
}

async fn serve(mut stream: TcpStream, addr: SocketAddr, state: Arc<Mutex<MockState>>, mut events: broadcast::Receiver<Value>) {
	let mut head = [0u8; 64];
	let n = match stream.peek(&mut head).await {
		Ok(0) | Err(_) => return,
		Ok(n) => n,
	};
	let head = String::from_utf8_lossy(&head[..n]).to_string();
	if head.starts_with("GET /json/version") {
		let body = json!({
			"Browser": "MockChrome/1.0",
			"Protocol-Version": "1.3",
			"webSocketDebuggerUrl": format!("ws://{addr}/devtools/browser/mock"),
		})
		.to_string();
		let response = format!(
			"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
			body.len()
		);
		let _ = stream.write_all(response.as_bytes()).await;
		let _ = stream.shutdown().await;
		return;
	}
	if !head.starts_with("GET ") {
		return;
	}

	let Ok(ws) = accept_async(stream).await else {
		return;
	};
	let (mut sink, mut source) = ws.split();
	loop {
		tokio::select! {
			frame = source.next() => {
				let Some(Ok(Message::Text(text))) = frame else {
					break;
				};
				let request: Value = serde_json::from_str(&text).unwrap();
				let replies = respond(&state, &request);
				for reply in replies {
					if sink.send(Message::Text(reply.to_string())).await.is_err() {
						return;
					}
				}
			}
			event = events.recv() => {
				let Ok(event) = event else {
					break;
				};
				if sink.send(Message::Text(event.to_string())).await.is_err() {
					return;
				}
			}
		}
	}
}

fn target_info(target: &MockTarget) -> Value {
	json!({"targetId": target.id, "type": target.kind, "url": target.url, "title": "", "attached": false})
}

/// Reply first, then any events the command triggers.
fn respond(state: &Mutex<MockState>, request: &Value) -> Vec<Value> {
	let id = request["id"].as_u64().unwrap();
	let method = request["method"].as_str().unwrap_or_default().to_string();
	let params = request.get("params").cloned().unwrap_or(Value::Null);
	let session_id = request.get("sessionId").and_then(Value::as_str).map(str::to_string);

	let mut state = state.lock();
	state.calls.push(method.clone());
	let session_target = session_id
		.as_ref()
		.and_then(|s| state.sessions.iter().find(|(session, _)| session == s).map(|(_, t)| t.clone()));

	let mut events = Vec::new();
	let stale = session_id.as_ref().is_some_and(|s| state.stale_sessions.contains(s));
	let outcome: Result<Value, (i64, String)> = match method.as_str() {
		_ if stale => Err((-32001, "Session with given id not found.".into())),
		"Target.getTargets" => Ok(json!({"targetInfos": state.targets.iter().map(target_info).collect::<Vec<_>>()})),
		"Target.createTarget" => {
			state.next_target += 1;
			let target = MockTarget {
				id: format!("page-{}", state.next_target),
				kind: "page".into(),
				url: params["url"].as_str().unwrap_or("about:blank").to_string(),
			};
			events.push(json!({"method": "Target.targetCreated", "params": {"targetInfo": target_info(&target)}}));
			let target_id = target.id.clone();
			state.targets.push(target);
			Ok(json!({"targetId": target_id}))
		}
		"Target.attachToTarget" => {
			let target_id = params["targetId"].as_str().unwrap_or_default().to_string();
			match state.targets.iter().find(|t| t.id == target_id).cloned() {
				Some(target) => {
					let session = format!("S{}-{}", state.sessions.len() + 1, target_id);
					state.sessions.push((session.clone(), target_id));
					events.push(json!({"method": "Target.attachedToTarget", "params": {"sessionId": session, "targetInfo": target_info(&target), "waitingForDebugger": false}}));
					Ok(json!({"sessionId": session}))
				}
				None => Err((-32602, "No target with given id found".into())),
			}
		}
		"Page.navigate" => {
			let url = params["url"].as_str().unwrap_or_default().to_string();
			if let Some(target) = session_target.as_ref().and_then(|t| state.targets.iter_mut().find(|x| &x.id == t)) {
				target.url = url;
			}
			Ok(json!({"frameId": "F1"}))
		}
		"Extensions.loadUnpacked" => {
			if state.native_reload {
				Ok(json!({"id": EXTENSION_ID}))
			} else {
				Err((-32601, "'Extensions.loadUnpacked' wasn't found".into()))
			}
		}
		"Runtime.evaluate" => {
			let expression = params["expression"].as_str().unwrap_or_default().to_string();
			let target = session_target.clone().unwrap_or_default();
			state.evaluations.push((target.clone(), expression.clone()));
			let target_url = state.targets.iter().find(|t| t.id == target).map(|t| t.url.clone()).unwrap_or_default();
			let value = if expression == "document.readyState" {
				json!("complete")
			} else if expression.contains("getManifest") && target_url.starts_with("chrome-extension://") {
				match &state.extension_manifest {
					Some((name, version)) => json!({"id": EXTENSION_ID, "name": name, "version": version}),
					None => Value::Null,
				}
			} else if expression == state.baseline_script {
				state.document.clone().map(Value::String).unwrap_or(Value::Null)
			} else {
				Value::Null
			};
			Ok(json!({"result": {"type": if value.is_null() { "undefined" } else { "object" }, "value": value}}))
		}
		_ => Ok(json!({})),
	};

	let mut reply = match outcome {
		Ok(result) => json!({"id": id, "result": result}),
		Err((code, message)) => json!({"id": id, "error": {"code": code, "message": message}}),
	};
	if let Some(session_id) = session_id {
		reply["sessionId"] = json!(session_id);
	}

	let mut out = vec![reply];
	out.extend(events);
	out
}
