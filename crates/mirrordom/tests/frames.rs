//! Mirroring documents with nested frames.

use mirrordom::core::filter::{scope_document, scope_document_mut};
use mirrordom::store::ChangeStore;
use mirrordom::{DocType, FramePath, PollOutcome};
use mirrordom_testkit::fixtures::{body_text, element_at, frame_at, load_frame, page};
use mirrordom_testkit::MirrorFixture;

fn nested() -> mirrordom::Document {
    let mut live = page("<p>top</p><iframe/>");
    let outer = frame_at(&FramePath::main(), &[1, 1]);
    load_frame(&mut live, &FramePath::main(), &[1, 1], page("<div><iframe/></div>"));
    load_frame(&mut live, &outer, &[1, 0, 0], page("<p>deep</p>"));
    live
}

#[tokio::test]
async fn test_nested_frames_mirror_outer_first() {
    let mut fixture = MirrorFixture::new(nested());
    fixture.sync().await.unwrap();
    fixture.assert_converged();

    let outer = frame_at(&FramePath::main(), &[1, 1]);
    let inner = frame_at(&outer, &[1, 0, 0]);
    assert_eq!(fixture.loads, vec![outer.clone(), inner.clone()]);
    assert_eq!(body_text(fixture.viewer.document(), &inner), "deep");

    let frames = fixture.relay.store().frames().await.unwrap();
    assert_eq!(frames.len(), 3);
}

#[tokio::test]
async fn test_deep_text_edit_travels_as_frame_diff() {
    let mut fixture = MirrorFixture::new(nested());
    fixture.sync().await.unwrap();
    let outer = frame_at(&FramePath::main(), &[1, 1]);
    let inner = frame_at(&outer, &[1, 0, 0]);

    {
        let doc = scope_document_mut(&mut fixture.live, &inner).unwrap();
        let p = element_at(doc, &[1, 0]);
        doc.clear_children(p);
        let text = doc.create_text("changed");
        doc.append_child(p, text);
    }

    let request = fixture.broadcaster.prepare_round(&fixture.live).unwrap().unwrap();
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.messages[0].kind(), "diffs");
    assert_eq!(request.messages[0].frame(), &inner);
    fixture.broadcaster.send_round(request).await.unwrap();

    // Frames already loaded need no further load events.
    let loads = fixture.loads.len();
    assert!(matches!(
        fixture.receive().await.unwrap(),
        PollOutcome::Applied { .. }
    ));
    assert_eq!(fixture.loads.len(), loads);
    assert_eq!(body_text(fixture.viewer.document(), &inner), "changed");
    fixture.assert_converged();
}

#[tokio::test]
async fn test_inserting_before_frame_readdresses_it() {
    let mut live = page("<iframe/>");
    load_frame(&mut live, &FramePath::main(), &[1, 0], page("<p>inner</p>"));
    let mut fixture = MirrorFixture::new(live);
    fixture.sync().await.unwrap();

    let body = fixture.live.body().unwrap();
    let p = fixture.live.create_element("p", DocType::Html);
    let text = fixture.live.create_text("first");
    fixture.live.append_child(p, text);
    fixture.live.insert_child(body, 0, p);

    fixture.sync().await.unwrap();
    fixture.assert_converged();

    let old = frame_at(&FramePath::main(), &[1, 0]);
    let new = frame_at(&FramePath::main(), &[1, 1]);
    assert_eq!(new.to_string(), "(m,1,1,i)");
    assert_eq!(fixture.loads.last(), Some(&new));
    let frames = fixture.relay.store().frames().await.unwrap();
    assert!(frames.contains(&new));
    assert!(!frames.contains(&old));
}

#[tokio::test]
async fn test_removed_frame_drops_its_log() {
    let mut live = page("<p>keep</p><iframe/>");
    load_frame(&mut live, &FramePath::main(), &[1, 1], page("<p>inner</p>"));
    let mut fixture = MirrorFixture::new(live);
    fixture.sync().await.unwrap();
    let frame = frame_at(&FramePath::main(), &[1, 1]);
    assert!(fixture.relay.store().changelog(&frame).await.unwrap().is_some());

    let iframe = element_at(&fixture.live, &[1, 1]);
    fixture.live.remove(iframe);
    fixture.sync().await.unwrap();

    assert!(fixture.relay.store().changelog(&frame).await.unwrap().is_none());
    assert!(fixture.broadcaster.registry().get(&frame).is_none());
    fixture.assert_converged();
}

#[tokio::test]
async fn test_loading_frame_is_not_diffed() {
    let mut live = page("<iframe/>");
    load_frame(&mut live, &FramePath::main(), &[1, 0], page("<p>inner</p>"));
    let mut fixture = MirrorFixture::new(live);
    fixture.sync().await.unwrap();
    let frame = frame_at(&FramePath::main(), &[1, 0]);

    {
        let inner = scope_document_mut(&mut fixture.live, &frame).unwrap();
        inner.set_ready_state(mirrordom::ReadyState::Loading);
        let p = element_at(inner, &[1, 0]);
        inner.set_attribute(p, "class", "busy");
    }
    let request = fixture.broadcaster.prepare_round(&fixture.live).unwrap().unwrap();
    assert!(request.messages.is_empty());
    assert_eq!(request.iframes, vec![frame.clone()]);
    fixture.broadcaster.send_round(request).await.unwrap();

    scope_document_mut(&mut fixture.live, &frame)
        .unwrap()
        .set_ready_state(mirrordom::ReadyState::Complete);
    fixture.sync().await.unwrap();
    fixture.assert_converged();

    let mirror = scope_document(fixture.viewer.document(), &frame).unwrap();
    let p = element_at(mirror, &[1, 0]);
    assert_eq!(mirror.element(p).unwrap().attribute("class"), Some("busy"));
}
