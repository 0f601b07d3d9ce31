mod common;

use shader_gallery::events::{EventBus, GalleryEvent};
use shader_gallery::layout::Rect;
use shader_gallery::{GalleryConfig, Scheduler};

use common::{gallery, table_colors, FakeHost, FRAME};

const DEFAULT_BACKGROUND: &str = "#f5f0e8";

#[test]
fn hover_background_is_debounced_between_neighbours() {
    let (gallery, _journal) = gallery(
        &[("a", "solid:#112233"), ("b", "solid:#445566")],
        FakeHost::strip(&["a", "b"]),
        GalleryConfig::default(),
    );
    let mut gallery = gallery.with_colors(table_colors(
        &[("solid:#112233", "#112233"), ("solid:#445566", "#445566")],
        DEFAULT_BACKGROUND,
    ));
    let mut bus = EventBus::new();
    let mut scheduler = Scheduler::start(&mut gallery, &mut bus);
    scheduler.tick(&mut gallery, FRAME);

    bus.emit(&GalleryEvent::PointerEnter("a".to_owned()));
    scheduler.tick(&mut gallery, FRAME);
    gallery.wait_idle();
    assert_eq!(gallery.background_color(), "#112233");

    // Leave A and reach B within the 100 ms debounce window.
    bus.emit(&GalleryEvent::PointerLeave("a".to_owned()));
    scheduler.tick(&mut gallery, FRAME);
    for _ in 0..3 {
        scheduler.tick(&mut gallery, FRAME);
    }
    assert_eq!(gallery.background_color(), "#112233");
    bus.emit(&GalleryEvent::PointerEnter("b".to_owned()));
    scheduler.tick(&mut gallery, FRAME);
    gallery.wait_idle();
    for _ in 0..20 {
        scheduler.tick(&mut gallery, FRAME);
    }
    assert_eq!(gallery.hooks().backgrounds, vec!["#112233", "#445566"]);

    // Back to A: its colour is cached, so it applies on the same frame.
    bus.emit(&GalleryEvent::PointerLeave("b".to_owned()));
    bus.emit(&GalleryEvent::PointerEnter("a".to_owned()));
    scheduler.tick(&mut gallery, FRAME);
    assert_eq!(gallery.background_color(), "#112233");
    assert_eq!(gallery.colors().in_flight(), 0);

    // Leaving for good resets once the delay passes.
    bus.emit(&GalleryEvent::PointerLeave("a".to_owned()));
    scheduler.tick(&mut gallery, FRAME);
    for _ in 0..4 {
        scheduler.tick(&mut gallery, FRAME);
    }
    assert_eq!(gallery.background_color(), "#112233");
    for _ in 0..4 {
        scheduler.tick(&mut gallery, FRAME);
    }
    assert_eq!(gallery.background_color(), DEFAULT_BACKGROUND);
    assert_eq!(
        gallery.hooks().backgrounds,
        vec!["#112233", "#445566", "#112233", DEFAULT_BACKGROUND]
    );
}

#[test]
fn failed_colour_extraction_falls_back_and_retries_later() {
    let (gallery, _journal) = gallery(
        &[("a", "solid:#112233")],
        FakeHost::strip(&["a"]),
        GalleryConfig::default(),
    );
    let mut gallery = gallery.with_colors(table_colors(&[], DEFAULT_BACKGROUND));
    let mut bus = EventBus::new();
    let mut scheduler = Scheduler::start(&mut gallery, &mut bus);

    bus.emit(&GalleryEvent::PointerEnter("a".to_owned()));
    scheduler.tick(&mut gallery, FRAME);
    gallery.wait_idle();

    assert_eq!(gallery.background_color(), DEFAULT_BACKGROUND);
    assert!(gallery.hooks().backgrounds.is_empty());
    assert!(gallery.colors().cache().is_empty());

    // Not cached, so hovering again extracts again and lands on the same
    // fallback without a callback.
    bus.emit(&GalleryEvent::PointerLeave("a".to_owned()));
    bus.emit(&GalleryEvent::PointerEnter("a".to_owned()));
    scheduler.tick(&mut gallery, FRAME);
    gallery.wait_idle();
    assert_eq!(gallery.background_color(), DEFAULT_BACKGROUND);
    assert!(gallery.colors().cache().is_empty());
}

#[test]
fn sampled_colours_come_from_decoded_pixels() {
    let (mut gallery, _journal) = gallery(
        &[("a", "solid:#e0e0e0")],
        FakeHost::strip(&["a"]),
        GalleryConfig::default(),
    );
    let mut bus = EventBus::new();
    let mut scheduler = Scheduler::start(&mut gallery, &mut bus);
    bus.emit(&GalleryEvent::PointerEnter("a".to_owned()));
    scheduler.tick(&mut gallery, FRAME);
    gallery.wait_idle();

    assert_eq!(gallery.background_color(), "#e0e0e0");
    assert_eq!(gallery.colors().cache().get("solid:#e0e0e0"), Some("#e0e0e0"));
}

#[test]
fn pointer_state_reaches_scene_uniforms() {
    let (mut gallery, journal) = gallery(
        &[("a", "solid:#aa0000"), ("b", "solid:#00bb00")],
        FakeHost::strip(&["a", "b"]),
        GalleryConfig::default(),
    );
    let mut bus = EventBus::new();
    let mut scheduler = Scheduler::start(&mut gallery, &mut bus);
    scheduler.tick(&mut gallery, FRAME);

    // Top-right corner of A's container: (1, 1) once Y is flipped.
    bus.emit(&GalleryEvent::PointerEnter("a".to_owned()));
    bus.emit(&GalleryEvent::PointerMove {
        form: "a".to_owned(),
        x: 320.0,
        y: 100.0,
    });
    scheduler.tick(&mut gallery, FRAME);

    {
        let journal = journal.borrow();
        let a = journal.uniforms["a"];
        assert!((a.mouse_over_pos[0] - 0.525).abs() < 1e-6);
        assert!((a.mouse_over_pos[1] - 0.525).abs() < 1e-6);
        assert!((a.mouse_enter_amount - 0.1).abs() < 1e-6);
        let b = journal.uniforms["b"];
        assert!((b.mouse_over_pos[0] - 0.5).abs() < 1e-6);
        assert_eq!(b.mouse_enter_amount, 0.0);
        assert_eq!(a.quad_size, [300.0, 400.0]);
    }

    for _ in 0..120 {
        scheduler.tick(&mut gallery, FRAME);
    }
    let pointer = gallery.pointer("a").unwrap();
    assert!(pointer.current[0] > 0.99 && pointer.current[0] <= 1.0);
    assert!(pointer.enter_amount > 0.99);

    bus.emit(&GalleryEvent::PointerLeave("a".to_owned()));
    scheduler.tick(&mut gallery, FRAME);
    let pointer = gallery.pointer("a").unwrap();
    assert_eq!(pointer.target, [0.5, 0.5]);
    assert_eq!(pointer.enter_target, 0.0);
    assert!(pointer.current[0] < 1.0);
}

#[test]
fn scroll_velocity_is_shared_clamped_and_decays() {
    let (mut gallery, journal) = gallery(
        &[("a", "solid:#aa0000"), ("b", "solid:#00bb00")],
        FakeHost::strip(&["a", "b"]),
        GalleryConfig::default(),
    );
    let mut bus = EventBus::new();
    let mut scheduler = Scheduler::start(&mut gallery, &mut bus);
    scheduler.tick(&mut gallery, FRAME);

    let mut offset = 0.0;
    for _ in 0..5 {
        offset += 5000.0;
        bus.emit(&GalleryEvent::Scroll(offset));
        scheduler.tick(&mut gallery, FRAME);
        let velocity = gallery.scroll_state().velocity;
        assert_eq!(velocity, 7.0);
        let journal = journal.borrow();
        assert_eq!(journal.uniforms["a"].scroll_velocity, velocity);
        assert_eq!(journal.uniforms["b"].scroll_velocity, velocity);
    }

    let mut previous = gallery.scroll_state().velocity;
    for _ in 0..30 {
        scheduler.tick(&mut gallery, FRAME);
        let velocity = gallery.scroll_state().velocity;
        assert!(velocity < previous && velocity > 0.0);
        previous = velocity;
    }
    assert!(previous < 0.5);

    bus.emit(&GalleryEvent::Scroll(-1.0e6));
    scheduler.tick(&mut gallery, FRAME);
    assert_eq!(gallery.scroll_state().velocity, -7.0);
}

#[test]
fn scroll_progress_fires_only_when_rounded_value_changes() {
    let (mut gallery, _journal) = gallery(
        &[("a", "solid:#aa0000")],
        FakeHost::strip(&["a"]),
        GalleryConfig::default(),
    );
    let mut bus = EventBus::new();
    let mut scheduler = Scheduler::start(&mut gallery, &mut bus);

    for offset in [500.0, 500.0, 504.0, 1000.0] {
        gallery.host_mut().metrics.offset = offset;
        bus.emit(&GalleryEvent::Scroll(offset));
        scheduler.tick(&mut gallery, FRAME);
    }
    assert_eq!(gallery.hooks().progress, vec![50, 100]);
}

#[test]
fn click_selects_form_with_current_image() {
    let (mut gallery, _journal) = gallery(
        &[("a", "solid:#aa0000"), ("b", "placeholder://b")],
        FakeHost::strip(&["a", "b"]),
        GalleryConfig::default(),
    );
    let mut bus = EventBus::new();
    let mut scheduler = Scheduler::start(&mut gallery, &mut bus);
    bus.emit(&GalleryEvent::Click("b".to_owned()));
    bus.emit(&GalleryEvent::Click("nope".to_owned()));
    scheduler.tick(&mut gallery, FRAME);

    assert_eq!(
        gallery.hooks().selections,
        vec![("b".to_owned(), "placeholder://b".to_owned())]
    );
}

#[test]
fn reveal_is_one_way_and_uses_horizontal_margin() {
    let mut host = FakeHost::strip(&["near", "far"]);
    host.rects
        .insert("far".to_owned(), Rect::new(1500.0, 100.0, 300.0, 400.0));
    let (mut gallery, _journal) = gallery(
        &[("near", "solid:#aa0000"), ("far", "solid:#00bb00")],
        host,
        GalleryConfig::default(),
    );
    let mut bus = EventBus::new();
    let mut scheduler = Scheduler::start(&mut gallery, &mut bus);
    scheduler.tick(&mut gallery, FRAME);
    assert!(gallery.is_revealed("near"));
    assert!(!gallery.is_revealed("far"));

    // 50 px inside the 100 px margin: under the 20% threshold.
    gallery
        .host_mut()
        .rects
        .insert("far".to_owned(), Rect::new(1050.0, 100.0, 300.0, 400.0));
    scheduler.tick(&mut gallery, FRAME);
    assert!(!gallery.is_revealed("far"));

    // 100 px of 300 inside the viewport plus margin.
    gallery
        .host_mut()
        .rects
        .insert("far".to_owned(), Rect::new(1000.0, 100.0, 300.0, 400.0));
    scheduler.tick(&mut gallery, FRAME);
    assert!(gallery.is_revealed("far"));

    gallery
        .host_mut()
        .rects
        .insert("far".to_owned(), Rect::new(5000.0, 100.0, 300.0, 400.0));
    scheduler.tick(&mut gallery, FRAME);
    assert!(gallery.is_revealed("far"));
    assert_eq!(gallery.host().revealed, vec!["near".to_owned(), "far".to_owned()]);
}
