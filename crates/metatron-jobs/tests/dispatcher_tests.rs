// SPDX-FileCopyrightText: 2026 Metatron Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests: dispatcher -> queue -> job -> mock channel.

use std::collections::BTreeMap;
use std::time::Duration;

use metatron_config::model::LoraPreset;
use metatron_core::{
    ActionKind, AdmissionKey, AttachmentKind, HistoryEntry, ImageFlavor, MessageId,
    MetatronError, ReplyTarget, UserStateStore,
};
use metatron_jobs::{
    ActionPress, ImageSpec, JobSettings, JobSpec, MusicSpec, Submission, render,
};
use metatron_queue::{Denial, JobOutcome};
use metatron_test_utils::{BackendCall, MockBackend, TestHarness};
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn image(flavor: ImageFlavor, prompt: &str) -> JobSpec {
    JobSpec::Image(ImageSpec::new(flavor, prompt))
}

fn press(token: &str, kind: ActionKind, clicker: &str) -> ActionPress {
    ActionPress {
        token: token.to_string(),
        kind,
        clicker: TestHarness::user(clicker),
        message: MessageId("mock-msg-1".into()),
        target: TestHarness::target(),
        private_target: ReplyTarget::new("mock", format!("dm-{clicker}")),
    }
}

#[tokio::test]
async fn chat_reply_is_mentioned_chunked_and_remembered() {
    let long_reply = "x".repeat(4100);
    let harness = TestHarness::builder()
        .with_backend(MockBackend::with_replies(vec![long_reply.as_str()]))
        .build();
    let amy = TestHarness::user("amy");

    assert!(harness.chat(&amy, "tell me a story").await.is_queued());
    let sent = harness.channel.wait_for_sent(4, WAIT).await;

    assert_eq!(sent[0].content, "@amy");
    assert_eq!(sent[1].content.chars().count(), 2000);
    assert_eq!(sent[2].content.chars().count(), 2000);
    assert_eq!(sent[3].content.chars().count(), 100);

    let history = harness
        .store
        .history(&AdmissionKey::from("amy"))
        .await
        .unwrap()
        .unwrap_or_default();
    assert_eq!(
        history,
        vec![
            HistoryEntry::user("tell me a story"),
            HistoryEntry::assistant(long_reply)
        ]
    );
    harness.shutdown().await;
}

#[tokio::test]
async fn existing_history_is_sent_with_the_next_chat() {
    let harness = TestHarness::builder().build();
    let amy = TestHarness::user("amy");

    harness.chat(&amy, "first").await;
    harness.wait_idle(WAIT).await;
    harness.chat(&amy, "second").await;
    harness.wait_idle(WAIT).await;

    let calls = harness.backend.calls().await;
    let BackendCall::Chat(first) = &calls[0] else {
        panic!("expected chat call");
    };
    let BackendCall::Chat(second) = &calls[1] else {
        panic!("expected chat call");
    };
    assert!(first.messages.is_none());
    assert_eq!(second.messages.as_ref().map(Vec::len), Some(2));
    harness.shutdown().await;
}

#[tokio::test]
async fn cleared_history_is_sent_as_an_empty_list() {
    let harness = TestHarness::builder().build();
    let amy = TestHarness::user("amy");

    harness.chat(&amy, "first").await;
    harness.wait_idle(WAIT).await;
    harness.submit(&amy, JobSpec::ClearHistory).await.unwrap();
    harness.wait_idle(WAIT).await;
    harness.chat(&amy, "again").await;
    harness.wait_idle(WAIT).await;

    let calls = harness.backend.calls().await;
    let chats: Vec<_> = calls
        .iter()
        .filter_map(|call| match call {
            BackendCall::Chat(request) => Some(request),
            _ => None,
        })
        .collect();
    assert_eq!(chats.len(), 2);
    assert!(chats[0].messages.is_none());
    assert_eq!(chats[1].messages, Some(Vec::new()));
    harness.shutdown().await;
}

#[tokio::test]
async fn history_is_capped_to_newest_entries() {
    let settings = JobSettings {
        history_cap: 3,
        ..JobSettings::default()
    };
    let harness = TestHarness::builder().with_settings(settings).build();
    let amy = TestHarness::user("amy");

    harness.chat(&amy, "one").await;
    harness.wait_idle(WAIT).await;
    harness.chat(&amy, "two").await;
    harness.wait_idle(WAIT).await;

    let history = harness
        .store
        .history(&AdmissionKey::from("amy"))
        .await
        .unwrap()
        .unwrap_or_default();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0], HistoryEntry::assistant("mock reply"));
    assert_eq!(history[2], HistoryEntry::assistant("mock reply"));
    assert_eq!(history[1], HistoryEntry::user("two"));
    harness.shutdown().await;
}

#[tokio::test]
async fn third_back_to_back_chat_is_rejected_until_a_slot_frees() {
    let mut harness = TestHarness::builder()
        .with_max_user_queue(2)
        .without_processor()
        .build();
    let processor = harness.take_processor().unwrap();
    let amy = TestHarness::user("amy");

    assert_eq!(harness.chat(&amy, "1").await, Submission::Queued { ahead: 0 });
    assert_eq!(harness.chat(&amy, "2").await, Submission::Queued { ahead: 1 });
    let third = harness.chat(&amy, "3").await;
    assert_eq!(third, Submission::Denied(Denial::IdentityLimit { limit: 2 }));
    assert_eq!(
        third.notice(&JobSpec::Chat {
            prompt: "3".into()
        }),
        "Queue limit reached, please wait until your current gen or gens finish"
    );

    let cancel = CancellationToken::new();
    assert_eq!(processor.process_one(&cancel).await, Some(JobOutcome::Completed));
    assert_eq!(harness.scheduler.in_flight(&amy), 1);
    assert!(harness.chat(&amy, "4").await.is_queued());
    assert_eq!(harness.scheduler.in_flight(&amy), 2);
}

#[tokio::test]
async fn card_timeout_reports_once_and_queue_moves_on() {
    let mut harness = TestHarness::builder().without_processor().build();
    let processor = harness.take_processor().unwrap();
    let amy = TestHarness::user("amy");
    let bob = TestHarness::user("bob");

    harness
        .backend
        .fail_next(MetatronError::Timeout {
            duration: Duration::from_secs(3600),
        })
        .await;
    let card = JobSpec::Card {
        prompt: "goblin chef".into(),
        count: 3,
    };
    assert!(harness.submit(&amy, card).await.unwrap().is_queued());
    assert!(harness.chat(&bob, "hello").await.is_queued());
    assert_eq!(harness.scheduler.in_flight(&amy), 1);

    let cancel = CancellationToken::new();
    assert_eq!(processor.process_one(&cancel).await, Some(JobOutcome::Completed));
    assert_eq!(harness.scheduler.in_flight(&amy), 0);

    let sent = harness.channel.sent_messages().await;
    assert_eq!(sent.len(), 1);
    assert!(sent[0].content.starts_with("@amy Card Pack Error for `goblin chef`"));
    assert!(sent[0].content.contains("timed out"));

    assert_eq!(processor.process_one(&cancel).await, Some(JobOutcome::Completed));
    assert_eq!(harness.scheduler.in_flight(&bob), 0);
    let sent = harness.channel.sent_messages().await;
    assert_eq!(sent[1].content, "@bob");
}

#[tokio::test]
async fn card_pack_is_delivered_together_behind_spoiler() {
    let mut loras = BTreeMap::new();
    loras.insert(
        "chat-1".to_string(),
        LoraPreset {
            lora_name: "pixel".into(),
            prompt_prefix: "pixel art, ".into(),
        },
    );
    let settings = JobSettings {
        channel_loras: loras,
        ..JobSettings::default()
    };
    let harness = TestHarness::builder().with_settings(settings).build();
    let amy = TestHarness::user("amy");

    let spec = JobSpec::Card {
        prompt: "goblin".into(),
        count: 3,
    };
    harness.submit(&amy, spec).await.unwrap();
    let sent = harness.channel.wait_for_sent(1, WAIT).await;

    assert!(sent[0].content.starts_with("Card Pack for @amy"));
    assert_eq!(sent[0].attachments.len(), 3);
    assert!(sent[0].spoiler);
    assert!(sent[0].actions.is_empty());

    let image_calls: Vec<_> = harness
        .backend
        .calls()
        .await
        .into_iter()
        .filter_map(|call| match call {
            BackendCall::Images(flavor, request) => Some((flavor, request)),
            _ => None,
        })
        .collect();
    assert_eq!(image_calls.len(), 3);
    for (flavor, request) in image_calls {
        assert_eq!(flavor, ImageFlavor::Sdxl);
        assert_eq!(request.batch_size, 1);
        assert_eq!(request.lora_name.as_deref(), Some("pixel"));
        assert!(request.prompt.starts_with("pixel art, "));
    }
    harness.shutdown().await;
}

#[tokio::test]
async fn image_result_carries_buttons_and_named_attachments() {
    let harness = TestHarness::builder().build();
    let amy = TestHarness::user("amy");

    harness
        .submit(&amy, image(ImageFlavor::Sdxl, "a cat riding a skateboard"))
        .await
        .unwrap();
    let sent = harness.channel.wait_for_sent(1, WAIT).await;

    let result = &sent[0];
    assert_eq!(
        result.content,
        "SDXL Gen for @amy: Prompt: `a cat riding a skateboard`"
    );
    assert_eq!(result.attachments.len(), 4);
    assert_eq!(result.attachments[0].filename, "a cat riding a skate.png");
    let kinds: Vec<_> = result.actions.iter().map(|a| a.kind).collect();
    assert_eq!(
        kinds,
        vec![ActionKind::Reroll, ActionKind::Mail, ActionKind::Delete]
    );
    harness.shutdown().await;
}

#[tokio::test]
async fn enhanced_image_rewrites_prompt_first() {
    let harness = TestHarness::builder()
        .with_backend(MockBackend::with_replies(vec!["a majestic fluffy cat"]))
        .build();
    let amy = TestHarness::user("amy");

    let mut spec = ImageSpec::new(ImageFlavor::Flux, "cat");
    spec.enhance = true;
    harness.submit(&amy, JobSpec::Image(spec)).await.unwrap();
    let sent = harness.channel.wait_for_sent(1, WAIT).await;

    assert_eq!(
        sent[0].content,
        "Flux Gen for @amy: Prompt: `cat` Enhanced Prompt: `a majestic fluffy cat`"
    );
    let calls = harness.backend.calls().await;
    let BackendCall::Chat(rewrite) = &calls[0] else {
        panic!("expected prompt rewrite first");
    };
    assert!(rewrite.prompt.ends_with("Here is the prompt: cat"));
    let BackendCall::Images(_, request) = &calls[1] else {
        panic!("expected image call");
    };
    assert_eq!(request.prompt, "a majestic fluffy cat");
    harness.shutdown().await;
}

#[tokio::test]
async fn image_pack_repeats_generation() {
    let harness = TestHarness::builder().build();
    let amy = TestHarness::user("amy");

    let mut spec = ImageSpec::new(ImageFlavor::Flux, "dog");
    spec.repeat = 3;
    harness.submit(&amy, JobSpec::Image(spec)).await.unwrap();
    let sent = harness.channel.wait_for_sent(1, WAIT).await;

    assert_eq!(sent[0].attachments.len(), 3);
    assert!(sent[0].content.starts_with("Flux Pack for @amy"));
    assert_eq!(harness.backend.calls().await.len(), 3);
    harness.shutdown().await;
}

#[tokio::test]
async fn reroll_is_owner_only_and_goes_through_admission() {
    let harness = TestHarness::builder().build();
    let amy = TestHarness::user("amy");

    harness
        .submit(&amy, image(ImageFlavor::Sdxl, "cat"))
        .await
        .unwrap();
    let sent = harness.channel.wait_for_sent(1, WAIT).await;
    harness.wait_idle(WAIT).await;
    let token = sent[0].actions[0].token.clone();

    let ack = harness
        .dispatcher
        .press(press(&token, ActionKind::Reroll, "bob"))
        .await;
    assert_eq!(ack, "Only the original requester can reroll this.");

    let ack = harness
        .dispatcher
        .press(press(&token, ActionKind::Reroll, "amy"))
        .await;
    assert!(ack.starts_with("Rerolling: "));
    let sent = harness.channel.wait_for_sent(2, WAIT).await;
    assert_eq!(sent[1].content, sent[0].content);
    harness.shutdown().await;
}

#[tokio::test]
async fn reroll_respects_queue_limit() {
    let harness = TestHarness::builder()
        .with_max_user_queue(1)
        .without_processor()
        .build();
    let amy = TestHarness::user("amy");
    let token = harness.dispatcher.context().actions.register(metatron_jobs::ActionEntry {
        owner: amy.clone(),
        target: TestHarness::target(),
        spec: image(ImageFlavor::Sdxl, "cat"),
        prompt: "cat".into(),
        attachments: Vec::new(),
    });

    harness.chat(&amy, "occupy the slot").await;
    let ack = harness
        .dispatcher
        .press(press(&token, ActionKind::Reroll, "amy"))
        .await;
    assert_eq!(ack, render::QUEUE_LIMIT_NOTICE);
    assert_eq!(harness.scheduler.in_flight(&amy), 1);
}

#[tokio::test]
async fn mail_sends_copy_to_private_target() {
    let harness = TestHarness::builder().build();
    let amy = TestHarness::user("amy");

    harness
        .submit(&amy, image(ImageFlavor::Flux, "a *fancy* cat"))
        .await
        .unwrap();
    let sent = harness.channel.wait_for_sent(1, WAIT).await;
    let token = sent[0].actions[1].token.clone();

    let ack = harness
        .dispatcher
        .press(press(&token, ActionKind::Mail, "bob"))
        .await;
    assert_eq!(ack, "DM'ing image...");

    let sent = harness.channel.wait_for_sent(2, WAIT).await;
    let mail = &sent[1];
    assert_eq!(mail.target, Some(ReplyTarget::new("mock", "dm-bob")));
    assert_eq!(mail.content, "a *fancy* cat");
    assert_eq!(mail.attachments[0].filename, "a fancy cat.png");
    harness.shutdown().await;
}

#[tokio::test]
async fn delete_only_removes_for_owner() {
    let harness = TestHarness::builder().build();
    let amy = TestHarness::user("amy");

    harness
        .submit(&amy, image(ImageFlavor::Sdxl, "cat"))
        .await
        .unwrap();
    let sent = harness.channel.wait_for_sent(1, WAIT).await;
    let token = sent[0].actions[2].token.clone();

    let ack = harness
        .dispatcher
        .press(press(&token, ActionKind::Delete, "bob"))
        .await;
    assert_eq!(ack, "Image deleted.");
    assert!(harness.channel.deleted().await.is_empty());

    harness
        .dispatcher
        .press(press(&token, ActionKind::Delete, "amy"))
        .await;
    let deleted = harness.channel.deleted().await;
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].1, MessageId("mock-msg-1".into()));

    let ack = harness
        .dispatcher
        .press(press(&token, ActionKind::Reroll, "amy"))
        .await;
    assert_eq!(ack, render::EXPIRED_ACTION_NOTICE);
    harness.shutdown().await;
}

#[tokio::test]
async fn music_is_delivered_as_audio() {
    let harness = TestHarness::builder().build();
    let amy = TestHarness::user("amy");

    let spec = JobSpec::Music(MusicSpec {
        prompt: "lofi beats".into(),
        lyrics: "[inst]".into(),
        duration_secs: MusicSpec::DEFAULT_DURATION_SECS,
    });
    harness.submit(&amy, spec).await.unwrap();
    let sent = harness.channel.wait_for_sent(1, WAIT).await;

    assert!(sent[0].content.starts_with("Ace Gen for @amy: Prompt: `lofi beats` Time:`"));
    assert_eq!(sent[0].attachments[0].kind(), AttachmentKind::Audio);
    let calls = harness.backend.calls().await;
    let BackendCall::Music(request) = &calls[0] else {
        panic!("expected music call");
    };
    assert_eq!(request.duration_secs, 30);
    assert_eq!(request.infer_steps, 120);
    harness.shutdown().await;
}

#[tokio::test]
async fn clear_history_empties_and_confirms() {
    let harness = TestHarness::builder().build();
    let amy = TestHarness::user("amy");

    harness.chat(&amy, "remember me").await;
    harness.wait_idle(WAIT).await;
    harness.submit(&amy, JobSpec::ClearHistory).await.unwrap();
    harness.wait_idle(WAIT).await;

    let history = harness
        .store
        .history(&AdmissionKey::from("amy"))
        .await
        .unwrap()
        .unwrap_or_default();
    assert!(history.is_empty());
    let acks = harness.channel.acknowledgements().await;
    assert_eq!(acks.last().unwrap().1, "@amy chat history cleared.");
    harness.shutdown().await;
}

#[tokio::test]
async fn banned_identity_is_denied_and_toggle_restores() {
    let harness = TestHarness::builder().build();
    let amy = TestHarness::user("amy");

    assert!(harness.dispatcher.toggle_ban("amy").await.unwrap());
    assert_eq!(
        harness.chat(&amy, "hi").await,
        Submission::Denied(Denial::Banned)
    );
    assert_eq!(harness.scheduler.in_flight(&amy), 0);

    assert!(!harness.dispatcher.toggle_ban("amy").await.unwrap());
    assert!(harness.chat(&amy, "hi").await.is_queued());
    harness.shutdown().await;
}

#[tokio::test]
async fn invalid_spec_is_an_error_not_a_denial() {
    let harness = TestHarness::builder().build();
    let amy = TestHarness::user("amy");

    let mut spec = ImageSpec::new(ImageFlavor::Sdxl, "cat");
    spec.batch_size = 25;
    let err = harness.submit(&amy, JobSpec::Image(spec)).await.unwrap_err();
    assert!(matches!(err, MetatronError::InvalidRequest(_)));
    assert_eq!(harness.scheduler.in_flight(&amy), 0);
    harness.shutdown().await;
}

#[tokio::test]
async fn delivery_failure_still_releases_slot() {
    let harness = TestHarness::builder().with_max_user_queue(1).build();
    let amy = TestHarness::user("amy");
    harness.channel.fail_sends(true);

    assert!(harness.chat(&amy, "hello").await.is_queued());
    harness.wait_idle(WAIT).await;
    assert_eq!(harness.scheduler.in_flight(&amy), 0);
    assert!(harness.chat(&amy, "again").await.is_queued());
    harness.shutdown().await;
}

#[tokio::test]
async fn submit_and_acknowledge_names_depth_ahead() {
    let harness = TestHarness::builder().without_processor().build();
    let amy = TestHarness::user("amy");
    let bob = TestHarness::user("bob");

    harness.chat(&bob, "first").await;
    harness
        .dispatcher
        .submit_and_acknowledge(amy, TestHarness::target(), image(ImageFlavor::Sdxl, "cat"))
        .await
        .unwrap();

    let acks = harness.channel.acknowledgements().await;
    assert_eq!(
        acks[0].1,
        "SDXL Image being created: 1 requests in queue ahead of you."
    );
}
