use std::sync::Arc;

use parking_lot::Mutex;

use super::*;
use crate::error::Error;

#[derive(Default)]
struct Recorder {
	launches: usize,
	fail_launch: bool,
	fail_reload: bool,
	reloads: Arc<Mutex<Vec<ReloadIntent>>>,
}

#[async_trait]
impl ReloadActions for Recorder {
	async fn launch(&mut self) -> Result<()> {
		self.launches += 1;
		if self.fail_launch {
			return Err(Error::Launch("no browser".into()));
		}
		Ok(())
	}

	async fn reload(&mut self, intent: &ReloadIntent) -> bool {
		self.reloads.lock().push(intent.clone());
		!self.fail_reload
	}
}

fn built(emitted: &[&str]) -> BuildEvent {
	BuildEvent::Built(RebuildNotification {
		emitted_assets: emitted.iter().map(|s| s.to_string()).collect(),
		..RebuildNotification::default()
	})
}

fn changed(files: &[&str]) -> BuildEvent {
	BuildEvent::Changed {
		files: files.iter().map(|s| s.to_string()).collect(),
	}
}

fn launched_engine() -> ReloadEngine<Recorder> {
	ReloadEngine::new(Recorder::default(), ReloadPolicy::default()).already_launched()
}

#[test]
fn classification() {
	let policy = ReloadPolicy::default().with_background_entries(["sw.js".to_string()]);
	assert_eq!(policy.classify("dist/manifest.json"), ReloadReason::Manifest);
	assert_eq!(policy.classify("_locales/en/messages.json"), ReloadReason::Locales);
	assert_eq!(policy.classify("src\\_locales\\de\\messages.json"), ReloadReason::Locales);
	assert_eq!(policy.classify("dist/sw.js"), ReloadReason::ServiceWorker);
	assert_eq!(policy.classify("content.js"), ReloadReason::None);
	assert_eq!(
		policy.classify_all(&vec!["_locales/en/messages.json".to_string(), "manifest.json".to_string()]),
		ReloadReason::Manifest
	);
}

#[test]
fn manifest_error_signature() {
	let errors = vec![
		"manifest.json: icon icons/128.png not found".to_string(),
		"Module not found: ./popup".to_string(),
		"ENOENT: no such file, referenced from manifest".to_string(),
	];
	assert_eq!(count_manifest_errors(&errors), 2);
}

#[tokio::test]
async fn manifest_change_then_clean_build_reloads_once() {
	let mut engine = launched_engine();
	let reloads = Arc::clone(&engine.actions().reloads);

	let decision = engine
		.handle(BuildEvent::Built(RebuildNotification {
			modified_files: vec!["manifest.json".into()],
			emitted_assets: vec!["manifest.json".into(), "background.js".into()],
			..RebuildNotification::default()
		}))
		.await;

	assert_eq!(decision, Decision::Reloaded(ReloadReason::Manifest));
	let reloads = reloads.lock();
	assert_eq!(reloads.len(), 1);
	assert_eq!(reloads[0].reason.as_str(), "manifest");
	assert_eq!(reloads[0].changed_assets, vec!["manifest.json", "background.js"]);
}

#[tokio::test]
async fn changed_event_sets_pending_reason_consumed_by_build() {
	let mut engine = launched_engine();

	assert_eq!(engine.handle(changed(&["_locales/en/messages.json"])).await, Decision::Pending(ReloadReason::Locales));
	assert_eq!(engine.state(), EngineState::AwaitingBuild);
	assert_eq!(engine.handle(changed(&["manifest.json"])).await, Decision::Pending(ReloadReason::Manifest));
	assert_eq!(engine.handle(changed(&["_locales/fr/messages.json"])).await, Decision::Pending(ReloadReason::Manifest));

	assert_eq!(engine.handle(built(&["manifest.json"])).await, Decision::Reloaded(ReloadReason::Manifest));
	assert_eq!(engine.pending_reason(), ReloadReason::None);
	assert_eq!(engine.state(), EngineState::Idle);

	assert_eq!(engine.handle(built(&["content.js"])).await, Decision::Reloaded(ReloadReason::None));
	assert_eq!(engine.actions().reloads.lock().len(), 2);
}

#[tokio::test]
async fn broken_build_never_reloads_and_keeps_pending_reason() {
	let mut engine = launched_engine();
	engine.handle(changed(&["manifest.json"])).await;

	let decision = engine
		.handle(BuildEvent::Built(RebuildNotification {
			has_errors: true,
			emitted_assets: vec!["background.js".into()],
			errors: vec!["manifest.json: file icons/16.png not found".into()],
			..RebuildNotification::default()
		}))
		.await;

	assert_eq!(decision, Decision::Skipped { manifest_errors: 1 });
	assert!(engine.actions().reloads.lock().is_empty());
	assert_eq!(engine.pending_reason(), ReloadReason::Manifest);
	assert_eq!(engine.state(), EngineState::Idle);
}

#[tokio::test]
async fn first_build_launches_instead_of_reloading() {
	let mut engine = ReloadEngine::new(Recorder::default(), ReloadPolicy::default());

	assert_eq!(engine.handle(built(&["manifest.json"])).await, Decision::Launched);
	assert_eq!(engine.actions().launches, 1);
	assert!(engine.actions().reloads.lock().is_empty());

	assert_eq!(engine.handle(built(&["popup.js"])).await, Decision::Reloaded(ReloadReason::None));
	assert_eq!(engine.actions().launches, 1);
}

#[tokio::test]
async fn failed_launch_is_retried_on_next_build() {
	let recorder = Recorder {
		fail_launch: true,
		..Recorder::default()
	};
	let mut engine = ReloadEngine::new(recorder, ReloadPolicy::default());

	assert_eq!(engine.handle(built(&["a.js"])).await, Decision::LaunchFailed);
	assert_eq!(engine.state(), EngineState::Idle);
	assert_eq!(engine.handle(built(&["a.js"])).await, Decision::LaunchFailed);
	assert_eq!(engine.actions().launches, 2);
}

#[tokio::test]
async fn reload_failure_returns_to_idle() {
	let recorder = Recorder {
		fail_reload: true,
		..Recorder::default()
	};
	let mut engine = ReloadEngine::new(recorder, ReloadPolicy::default()).already_launched();

	assert_eq!(engine.handle(built(&["background.js"])).await, Decision::ReloadFailed(ReloadReason::ServiceWorker));
	assert_eq!(engine.state(), EngineState::Idle);
}

#[tokio::test]
async fn empty_build_does_nothing() {
	let mut engine = launched_engine();
	assert_eq!(engine.handle(built(&[])).await, Decision::Idle);
	assert!(engine.actions().reloads.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn run_coalesces_builds_within_debounce() {
	let engine = launched_engine();
	let reloads = Arc::clone(&engine.actions().reloads);
	let (tx, rx) = mpsc::channel(16);

	let task = tokio::spawn(async move {
		let mut engine = engine;
		engine.run(rx).await;
		engine
	});

	tx.send(changed(&["manifest.json"])).await.unwrap();
	tx.send(built(&["manifest.json"])).await.unwrap();
	tx.send(built(&["background.js"])).await.unwrap();
	tokio::time::sleep(Duration::from_secs(1)).await;
	tx.send(built(&["popup.js"])).await.unwrap();
	drop(tx);

	let engine = task.await.unwrap();
	let reloads = reloads.lock();
	assert_eq!(reloads.len(), 2);
	assert_eq!(reloads[0].reason, ReloadReason::Manifest);
	assert_eq!(reloads[0].changed_assets, vec!["manifest.json", "background.js"]);
	assert_eq!(reloads[1].reason, ReloadReason::None);
	assert_eq!(engine.state(), EngineState::Idle);
}
