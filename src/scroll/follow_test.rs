use super::*;

fn follower() -> ScrollFollower {
    ScrollFollower::new(0.6, 0.5, Duration::from_millis(100))
}

fn moved_to(step: Step) -> f64 {
    match step {
        Step::Moved(pos) => pos,
        other => panic!("expected a move, got {other:?}"),
    }
}

fn target(pos: f64, font: f64) -> ScrollMessage {
    ScrollMessage { scroll_position: pos, line_number: 0, font_size: font, timestamp: 0 }
}

#[test]
fn converges_without_overshoot() {
    let mut f = follower();
    let now = Instant::now();
    f.retarget(&target(1000.0, 0.0), now);

    let mut gap = 1000.0_f64;
    let mut frames = 0;
    loop {
        frames += 1;
        match f.step(now) {
            Step::Moved(pos) => {
                assert!(pos <= 1000.0, "overshot to {pos}");
                let next_gap = (1000.0 - pos).abs();
                assert!(next_gap < gap, "gap did not shrink");
                gap = next_gap;
            }
            Step::Landed(pos) => {
                assert!((pos - 1000.0).abs() < f64::EPSILON);
                break;
            }
            other => panic!("unexpected step {other:?}"),
        }
        assert!(frames < 50, "did not converge");
    }
    assert!(!f.is_animating());
    assert_eq!(f.step(now), Step::Idle);
}

#[test]
fn first_frame_covers_sixty_percent() {
    let mut f = follower();
    let now = Instant::now();
    f.retarget(&target(100.0, 0.0), now);
    assert!((moved_to(f.step(now)) - 60.0).abs() < 1e-9);
    assert!((moved_to(f.step(now)) - 84.0).abs() < 1e-9);
}

#[test]
fn new_target_replaces_without_resetting_position() {
    let mut f = follower();
    let now = Instant::now();
    f.retarget(&target(100.0, 0.0), now);
    f.step(now);
    f.retarget(&target(200.0, 0.0), now);
    assert!((f.current() - 60.0).abs() < 1e-9);
    assert!((moved_to(f.step(now)) - 144.0).abs() < 1e-9);
}

#[test]
fn font_change_holds_for_settle_delay() {
    let mut f = follower();
    let t0 = Instant::now();
    assert!(f.retarget(&target(300.0, 20.0), t0));
    assert_eq!(f.font_size(), Some(20.0));
    assert_eq!(f.step(t0 + Duration::from_millis(50)), Step::Settling);
    assert!(matches!(f.step(t0 + Duration::from_millis(100)), Step::Moved(_)));

    assert!(!f.retarget(&target(310.0, 20.0), t0 + Duration::from_millis(120)));
}

#[test]
fn cancel_clears_target_and_hold() {
    let mut f = follower();
    let t0 = Instant::now();
    f.retarget(&target(300.0, 20.0), t0);
    f.cancel();
    assert!(!f.is_animating());
    assert_eq!(f.settle_until(), None);
    assert_eq!(f.step(t0), Step::Idle);
}

#[test]
fn target_at_current_lands_immediately() {
    let mut f = follower();
    let now = Instant::now();
    f.set_current(42.0);
    f.retarget(&target(42.2, 0.0), now);
    assert_eq!(f.step(now), Step::Landed(42.2));
}
