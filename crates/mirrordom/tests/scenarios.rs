//! End-to-end scenarios for the differ, the patch applier and the viewer's
//! frame-load suspension.

use mirrordom::core::filter::{scope_document, scope_frame_mut};
use mirrordom::core::properties::assign_property;
use mirrordom::core::record::ReplaceContent;
use mirrordom::core::{apply_diffs, diff, PropValue, PropertyMap, PropertyTable, Snapshot};
use mirrordom::sync::ViewerEvent;
use mirrordom::{DiffRecord, DocType, Document, FramePath, Path, PollOutcome, ReadyState};
use mirrordom_testkit::fixtures::{body_text, element_at, frame_at, load_frame, page};
use mirrordom_testkit::MirrorFixture;

fn records(before: &Document, after: &Document) -> Vec<DiffRecord> {
    let mut table = PropertyTable::new();
    let snapshot = Snapshot::capture(before, &mut table);
    diff(after, &snapshot, &mut table).records().to_vec()
}

#[test]
fn test_appended_item_is_one_replace() {
    let before = page("<ul><li>a</li><li>b</li></ul>");
    let after = page("<ul><li>a</li><li>b</li><li>c</li></ul>");

    let records = records(&before, &after);
    assert_eq!(
        records,
        vec![DiffRecord::Replace {
            path: Path::new(vec![1, 0, 2]),
            doc_type: DocType::Html,
            content: ReplaceContent::Markup("<li>c</li>".into()),
            trailing_text: None,
            props: vec![],
        }]
    );
}

#[test]
fn test_checked_toggle_is_one_property_change() {
    let before = page(r#"<form><input type="checkbox"/></form>"#);
    let mut after = before.clone();
    let input = element_at(&after, &[1, 0, 0]);
    assign_property(&mut after, input, "checked", &PropValue::Bool(true));

    let mut changed = PropertyMap::new();
    changed.insert("checked".into(), PropValue::Bool(true));
    assert_eq!(
        records(&before, &after),
        vec![DiffRecord::PropertiesChanged {
            path: Path::new(vec![1, 0, 0]),
            doc_type: DocType::Html,
            changed,
            removed: vec![],
        }]
    );
}

#[test]
fn test_middle_removal_keeps_third_item() {
    let before = page("<ul><li>a</li><li>b</li><li>c</li></ul>");
    let mut after = before.clone();
    let second = element_at(&after, &[1, 0, 1]);
    after.remove(second);

    let records = records(&before, &after);
    let deletes: Vec<_> = records
        .iter()
        .filter(|r| matches!(r, DiffRecord::Deleted { .. }))
        .collect();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].path(), &Path::new(vec![1, 0, 2]));

    let mut mirror = before.clone();
    apply_diffs(&mut mirror, &records).unwrap();
    let list = element_at(&mirror, &[1, 0]);
    let items: Vec<String> = mirror
        .children(list)
        .iter()
        .map(|&li| mirror.text_content(li))
        .collect();
    assert_eq!(items, vec!["a", "c"]);
}

#[tokio::test]
async fn test_frame_load_resumes_exactly_once() {
    let mut live = page("<p>outer</p><iframe/>");
    load_frame(&mut live, &FramePath::main(), &[1, 1], page("inner"));
    let mut fixture = MirrorFixture::new(live);
    let mut events = fixture.viewer.subscribe();
    let frame = frame_at(&FramePath::main(), &[1, 1]);

    fixture.broadcast().await.unwrap();
    let outcome = fixture.viewer.poll().await.unwrap();
    assert_eq!(outcome, PollOutcome::Suspended { frame: frame.clone() });
    assert_eq!(fixture.viewer.pending().unwrap().resume_index(), 1);

    // Forced to blank and waiting for its load.
    let host = scope_frame_mut(fixture.viewer.document_mut(), &frame)
        .unwrap()
        .unwrap();
    assert_eq!(host.ready_state(), ReadyState::Loading);
    assert_eq!(host.document().unwrap().url(), Some("about:blank"));

    // Polls are skipped while suspended.
    assert_eq!(fixture.viewer.poll().await.unwrap(), PollOutcome::Skipped);

    let mut resumed = 0;
    for _ in 0..3 {
        if fixture.viewer.on_frame_load(&frame).is_some() {
            resumed += 1;
        }
    }
    assert_eq!(resumed, 1);
    fixture.assert_converged();
    assert_eq!(body_text(fixture.viewer.document(), &frame), "inner");

    let mut saw_wait = false;
    while let Ok(event) = events.try_recv() {
        if event == (ViewerEvent::AwaitingFrameLoad { frame: frame.clone() }) {
            saw_wait = true;
        }
    }
    assert!(saw_wait);
}

#[tokio::test]
async fn test_navigated_frame_is_blanked_first() {
    let mut live = page("<iframe/>");
    load_frame(&mut live, &FramePath::main(), &[1, 0], page("first"));
    let mut fixture = MirrorFixture::new(live);
    fixture.sync().await.unwrap();
    fixture.assert_converged();

    // The frame loads a new page on the broadcaster side.
    load_frame(&mut fixture.live, &FramePath::main(), &[1, 0], page("second"));
    fixture.broadcast().await.unwrap();

    let frame = frame_at(&FramePath::main(), &[1, 0]);
    let outcome = fixture.viewer.poll().await.unwrap();
    assert_eq!(outcome, PollOutcome::Suspended { frame: frame.clone() });
    assert!(fixture.viewer.on_frame_load(&frame).is_some());
    assert_eq!(body_text(fixture.viewer.document(), &frame), "second");
    fixture.assert_converged();
}

#[tokio::test]
async fn test_ignored_content_never_reaches_viewer() {
    let live = page(r#"<script>steal()</script><a href="http://x/" onclick="go()">link</a>"#);
    let mut fixture = MirrorFixture::new(live);
    fixture.sync().await.unwrap();
    fixture.assert_converged();

    let mirror = scope_document(fixture.viewer.document(), &FramePath::main()).unwrap();
    let link = element_at(mirror, &[1, 0]);
    let el = mirror.element(link).unwrap();
    assert_eq!(el.attribute("href"), Some("#"));
    assert_eq!(el.attribute("onclick"), None);
    assert!(mirror
        .descendants(mirror.root())
        .iter()
        .all(|&id| mirror.element(id).map_or(true, |e| !e.has_tag("script"))));
}

#[tokio::test]
async fn test_link_change_after_sync_stays_neutralised() {
    let mut fixture = MirrorFixture::new(page(r#"<a href="http://a/">x</a>"#));
    fixture.sync().await.unwrap();

    let link = element_at(&fixture.live, &[1, 0]);
    fixture.live.set_attribute(link, "href", "http://secret.example/");
    fixture.live.set_attribute(link, "title", "t");
    fixture.sync().await.unwrap();
    fixture.assert_converged();

    let mirror = scope_document(fixture.viewer.document(), &FramePath::main()).unwrap();
    let el = mirror.element(element_at(mirror, &[1, 0])).unwrap();
    assert_eq!(el.attribute("href"), Some("#"));
    assert_eq!(el.attribute("title"), Some("t"));
}

#[tokio::test]
async fn test_comment_closing_markers_stay_inside_comment() {
    let mut live = page("<p>keep</p>");
    let body = live.body().unwrap();
    let comment = live.create_comment("--><p>leak</p><!--");
    live.append_child(body, comment);
    let mut fixture = MirrorFixture::new(live);
    fixture.sync().await.unwrap();
    fixture.assert_converged();

    let mirror = scope_document(fixture.viewer.document(), &FramePath::main()).unwrap();
    assert_eq!(mirror.text_content(mirror.body().unwrap()), "keep");
}

#[tokio::test]
async fn test_mixed_case_attribute_removal_reaches_viewer() {
    let mut fixture = MirrorFixture::new(page("<p>x</p>"));
    let p = element_at(&fixture.live, &[1, 0]);
    fixture.live.set_attribute(p, "Title", "shown");
    fixture.sync().await.unwrap();
    fixture.assert_converged();

    fixture.live.remove_attribute(p, "TITLE");
    fixture.sync().await.unwrap();
    fixture.assert_converged();

    let mirror = scope_document(fixture.viewer.document(), &FramePath::main()).unwrap();
    let el = mirror.element(element_at(mirror, &[1, 0])).unwrap();
    assert!(el.attributes.is_empty());
}
