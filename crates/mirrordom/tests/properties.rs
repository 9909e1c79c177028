//! Randomised end-to-end convergence through the relay.

use proptest::prelude::*;

use mirrordom::core::filter::scope_document;
use mirrordom::sync::active_content;
use mirrordom::FramePath;
use mirrordom_testkit::generators::{apply_mutation, build_page, framed_body_spec, mutations};
use mirrordom_testkit::MirrorFixture;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_mirror_converges_after_every_round(
        body in framed_body_spec(),
        rounds in prop::collection::vec(mutations(4), 1..4),
    ) {
        let rt = runtime();
        let mut fixture = MirrorFixture::new(build_page(&body));
        rt.block_on(fixture.sync()).unwrap();
        prop_assert!(fixture.convergence().is_converged(), "{:?}", fixture.convergence());

        for script in &rounds {
            for m in script {
                apply_mutation(&mut fixture.live, m);
            }
            rt.block_on(fixture.sync()).unwrap();
            prop_assert!(fixture.convergence().is_converged(), "{:?}", fixture.convergence());
        }
    }

    #[test]
    fn test_late_viewer_converges_from_full_log(
        body in framed_body_spec(),
        rounds in prop::collection::vec(mutations(4), 1..4),
    ) {
        let rt = runtime();
        let mut fixture = MirrorFixture::new(build_page(&body));
        for script in &rounds {
            rt.block_on(fixture.broadcast()).unwrap();
            for m in script {
                apply_mutation(&mut fixture.live, m);
            }
        }
        rt.block_on(fixture.sync()).unwrap();
        prop_assert!(fixture.convergence().is_converged(), "{:?}", fixture.convergence());
    }

    #[test]
    fn test_mirror_never_holds_active_content(
        body in framed_body_spec(),
        script in mutations(6),
    ) {
        let rt = runtime();
        let mut fixture = MirrorFixture::new(build_page(&body));
        rt.block_on(fixture.sync()).unwrap();
        for m in &script {
            apply_mutation(&mut fixture.live, m);
        }
        rt.block_on(fixture.sync()).unwrap();

        let mirror = scope_document(fixture.viewer.document(), &FramePath::main()).unwrap();
        prop_assert_eq!(active_content(mirror), None);
    }
}
