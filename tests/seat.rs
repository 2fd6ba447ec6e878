//! End-to-end tests of a headless seat: events injected through virtual
//! devices come back processed over the event queue.

use std::time::Duration;

use otto_input::{
    A11ySettings, Backend, BarrierDef, BarrierDirections, ButtonState, DeviceCapabilities, Event,
    InputConfig, KeyState, MouseKeysConfig, Pos, RepeatConfig, Seat,
};

const KEY_A: u32 = 30;
const KEY_LEFTSHIFT: u32 = 42;
const KEY_KP5: u32 = 76;
const BTN_LEFT: u32 = 0x110;
const TIMEOUT: Duration = Duration::from_secs(5);

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn start() -> (Seat, otto_input::EventQueue) {
    init_logging();
    Seat::start(InputConfig::default(), Backend::Headless).expect("headless seat")
}

/// Scan the queue until an event matches, failing on timeout. Events that
/// do not match are discarded.
fn wait_for<T>(
    queue: &otto_input::EventQueue,
    mut pred: impl FnMut(&Event) -> Option<T>,
) -> T {
    let deadline = std::time::Instant::now() + TIMEOUT;
    loop {
        let remaining = deadline
            .checked_duration_since(std::time::Instant::now())
            .expect("timed out waiting for event");
        let event = queue
            .recv_timeout(remaining)
            .expect("timed out waiting for event");
        if let Some(out) = pred(&event) {
            return out;
        }
    }
}

#[test]
fn virtual_device_announce_and_remove() {
    let (seat, queue) = start();
    let device = seat
        .create_virtual_device("test pointer", DeviceCapabilities::POINTER)
        .unwrap();
    let id = device.id();

    let (name, caps) = wait_for(&queue, |ev| match ev {
        Event::DeviceAdded {
            device,
            name,
            capabilities,
        } if *device == id => Some((name.clone(), *capabilities)),
        _ => None,
    });
    assert_eq!(name, "test pointer");
    assert_eq!(caps, DeviceCapabilities::POINTER);
    assert!(seat.devices().iter().any(|d| d.id == id));

    device.remove().unwrap();
    wait_for(&queue, |ev| match ev {
        Event::DeviceRemoved { device } if *device == id => Some(()),
        _ => None,
    });
    assert!(seat.devices().is_empty());
}

#[test]
fn relative_motion_moves_and_clamps() {
    let (seat, queue) = start();
    seat.set_screen_extents(Some((800.0, 600.0))).unwrap();
    let device = seat
        .create_virtual_device("mouse", DeviceCapabilities::POINTER)
        .unwrap();

    device.motion(10.0, 20.0).unwrap();
    let pos = wait_for(&queue, |ev| match ev {
        Event::Motion { pos, .. } => Some(*pos),
        _ => None,
    });
    assert_eq!(pos, Pos::new(10.0, 20.0));

    // a huge delta pins the cursor to the screen edge
    device.motion(5000.0, -5000.0).unwrap();
    let pos = wait_for(&queue, |ev| match ev {
        Event::Motion { pos, .. } => Some(*pos),
        _ => None,
    });
    assert_eq!(pos, Pos::new(799.0, 0.0));
    assert_eq!(seat.pointer_position(), pos);
}

#[test]
fn absolute_motion_is_scaled_to_screen() {
    let (seat, queue) = start();
    seat.set_screen_extents(Some((1000.0, 500.0))).unwrap();
    let device = seat
        .create_virtual_device("touchscreen pointer", DeviceCapabilities::POINTER)
        .unwrap();

    device.motion_absolute(0.5, 0.5).unwrap();
    let pos = wait_for(&queue, |ev| match ev {
        Event::Motion { pos, .. } => Some(*pos),
        _ => None,
    });
    assert_eq!(pos, Pos::new(500.0, 250.0));
}

#[test]
fn button_events_carry_state() {
    let (seat, queue) = start();
    let device = seat
        .create_virtual_device("mouse", DeviceCapabilities::POINTER)
        .unwrap();

    device.button(BTN_LEFT, ButtonState::Pressed).unwrap();
    device.button(BTN_LEFT, ButtonState::Released).unwrap();
    let first = wait_for(&queue, |ev| match ev {
        Event::Button { button, state, .. } => Some((*button, *state)),
        _ => None,
    });
    assert_eq!(first, (BTN_LEFT, ButtonState::Pressed));
    let second = wait_for(&queue, |ev| match ev {
        Event::Button { button, state, .. } => Some((*button, *state)),
        _ => None,
    });
    assert_eq!(second, (BTN_LEFT, ButtonState::Released));
    drop(seat);
}

#[test]
fn key_events_resolve_keysyms_and_modifiers() {
    let (seat, queue) = start();
    let device = seat
        .create_virtual_device("keyboard", DeviceCapabilities::KEYBOARD)
        .unwrap();

    device.key(KEY_A, KeyState::Pressed).unwrap();
    let keysym = wait_for(&queue, |ev| match ev {
        Event::Key { key, keysym, state, .. } if *key == KEY_A && *state == KeyState::Pressed => {
            Some(*keysym)
        }
        _ => None,
    });
    assert_eq!(keysym, 0x61); // XKB_KEY_a
    device.key(KEY_A, KeyState::Released).unwrap();

    device.key(KEY_LEFTSHIFT, KeyState::Pressed).unwrap();
    device.key(KEY_A, KeyState::Pressed).unwrap();
    let (keysym, modifiers) = wait_for(&queue, |ev| match ev {
        Event::Key {
            key,
            keysym,
            state,
            modifiers,
            ..
        } if *key == KEY_A && *state == KeyState::Pressed => Some((*keysym, *modifiers)),
        _ => None,
    });
    assert_eq!(keysym, 0x41); // XKB_KEY_A
    assert_ne!(modifiers.depressed, 0);
    assert_eq!(seat.modifiers().depressed, modifiers.depressed);
}

#[test]
fn key_repeat_fires_until_release() {
    let (seat, queue) = start();
    seat.set_repeat(RepeatConfig {
        enabled: true,
        delay_ms: 20,
        interval_ms: 10,
    })
    .unwrap();
    let device = seat
        .create_virtual_device("keyboard", DeviceCapabilities::KEYBOARD)
        .unwrap();

    device.key(KEY_A, KeyState::Pressed).unwrap();
    wait_for(&queue, |ev| match ev {
        Event::Key { key, repeat, .. } if *key == KEY_A && !repeat => Some(()),
        _ => None,
    });
    // at least two repeats while held
    for _ in 0..2 {
        wait_for(&queue, |ev| match ev {
            Event::Key { key, repeat, state, .. }
                if *key == KEY_A && *repeat && *state == KeyState::Pressed =>
            {
                Some(())
            }
            _ => None,
        });
    }
    device.key(KEY_A, KeyState::Released).unwrap();
    wait_for(&queue, |ev| match ev {
        Event::Key { key, state, .. } if *key == KEY_A && *state == KeyState::Released => Some(()),
        _ => None,
    });
    // once released, nothing but silence from this key
    std::thread::sleep(Duration::from_millis(50));
    while let Some(event) = queue.try_recv() {
        if let Event::Key { key, repeat, .. } = event {
            assert!(!(key == KEY_A && repeat), "repeat after release");
        }
    }
}

#[test]
fn touch_slots_are_seat_wide() {
    let (seat, queue) = start();
    seat.set_screen_extents(Some((100.0, 100.0))).unwrap();
    let device = seat
        .create_virtual_device("touchscreen", DeviceCapabilities::TOUCH)
        .unwrap();

    device.touch_down(7, 0.1, 0.2).unwrap();
    let (slot, pos) = wait_for(&queue, |ev| match ev {
        Event::TouchDown { seat_slot, pos, .. } => Some((*seat_slot, *pos)),
        _ => None,
    });
    assert_eq!(slot, 0); // device slot 7 renumbered to the lowest free
    assert_eq!(pos, Pos::new(10.0, 20.0));
    assert_eq!(seat.touch_points().len(), 1);

    device.touch_motion(7, 0.3, 0.2).unwrap();
    wait_for(&queue, |ev| match ev {
        Event::TouchMotion { seat_slot, pos, .. } if *seat_slot == slot => Some(*pos),
        _ => None,
    });

    device.touch_up(7).unwrap();
    wait_for(&queue, |ev| match ev {
        Event::TouchUp { seat_slot, .. } if *seat_slot == slot => Some(()),
        _ => None,
    });
    assert!(seat.touch_points().is_empty());
}

#[test]
fn duplicate_touch_down_is_dropped() {
    let (seat, queue) = start();
    let device = seat
        .create_virtual_device("touchscreen", DeviceCapabilities::TOUCH)
        .unwrap();

    device.touch_down(0, 0.2, 0.2).unwrap();
    let slot = wait_for(&queue, |ev| match ev {
        Event::TouchDown { seat_slot, .. } => Some(*seat_slot),
        _ => None,
    });

    // a second down on the same device slot is inconsistent device state;
    // it must be swallowed and the seat must keep running
    device.touch_down(0, 0.8, 0.8).unwrap();
    device.touch_up(0).unwrap();
    wait_for(&queue, |ev| match ev {
        Event::TouchDown { .. } => panic!("duplicate touch-down was forwarded"),
        Event::TouchUp { seat_slot, .. } if *seat_slot == slot => Some(()),
        _ => None,
    });
    assert!(seat.touch_points().is_empty());
}

#[test]
fn removing_device_cancels_its_touches() {
    let (seat, queue) = start();
    let device = seat
        .create_virtual_device("touchscreen", DeviceCapabilities::TOUCH)
        .unwrap();
    device.touch_down(0, 0.5, 0.5).unwrap();
    let slot = wait_for(&queue, |ev| match ev {
        Event::TouchDown { seat_slot, .. } => Some(*seat_slot),
        _ => None,
    });

    device.remove().unwrap();
    wait_for(&queue, |ev| match ev {
        Event::TouchCancel { seat_slot, .. } if *seat_slot == slot => Some(()),
        _ => None,
    });
    assert!(seat.touch_points().is_empty());
}

#[test]
fn barrier_blocks_until_released() {
    let (seat, queue) = start();
    seat.set_screen_extents(Some((800.0, 600.0))).unwrap();
    let device = seat
        .create_virtual_device("mouse", DeviceCapabilities::POINTER)
        .unwrap();

    // start left of a vertical barrier at x=400
    device.motion(100.0, 100.0).unwrap();
    let barrier = seat
        .add_barrier(BarrierDef {
            x1: 400.0,
            y1: 0.0,
            x2: 400.0,
            y2: 600.0,
            directions: BarrierDirections::POSITIVE_X,
            sticky: false,
        })
        .unwrap();

    device.motion(600.0, 0.0).unwrap();
    let (hit_barrier, event_id) = wait_for(&queue, |ev| match ev {
        Event::BarrierHit(e) => Some((e.barrier, e.event_id)),
        _ => None,
    });
    assert_eq!(hit_barrier, barrier);
    assert!(seat.pointer_position().x <= 400.0);

    // released barriers let the recorded trigger through
    seat.release_barrier(barrier, event_id).unwrap();
    device.motion(300.0, 0.0).unwrap();
    let pos = wait_for(&queue, |ev| match ev {
        Event::Motion { pos, .. } if pos.x > 400.0 => Some(*pos),
        _ => None,
    });
    assert!(pos.x > 400.0);

    wait_for(&queue, |ev| match ev {
        Event::BarrierLeft(e) if e.barrier == barrier => Some(()),
        _ => None,
    });
}

#[test]
fn invalid_barrier_is_rejected() {
    let (seat, _queue) = start();
    let result = seat.add_barrier(BarrierDef {
        x1: 0.0,
        y1: 0.0,
        x2: 10.0,
        y2: 10.0,
        directions: BarrierDirections::POSITIVE_X,
        sticky: false,
    });
    assert!(result.is_err());
}

#[test]
fn mouse_keys_click_comes_from_a_synthesized_pointer() {
    let (seat, queue) = start();
    let keyboard = seat
        .create_virtual_device("keyboard", DeviceCapabilities::KEYBOARD)
        .unwrap();
    seat.set_a11y(
        A11ySettings {
            mouse_keys: true,
            ..Default::default()
        },
        MouseKeysConfig::default(),
    )
    .unwrap();
    let flags = wait_for(&queue, |ev| match ev {
        Event::A11yFlagsChanged(flags) => Some(*flags),
        _ => None,
    });
    assert!(flags.contains(otto_input::A11yFlags::MOUSE_KEYS));
    assert_eq!(seat.a11y_flags(), flags);

    keyboard.key(KEY_KP5, KeyState::Pressed).unwrap();
    let (device, button, state) = wait_for(&queue, |ev| match ev {
        Event::Button {
            device,
            button,
            state,
            ..
        } => Some((*device, *button, *state)),
        _ => None,
    });
    assert_ne!(device, keyboard.id());
    assert_eq!(button, BTN_LEFT);
    assert_eq!(state, ButtonState::Pressed);
    keyboard.key(KEY_KP5, KeyState::Released).unwrap();
}

#[test]
fn sticky_latch_uppercases_the_next_key() {
    let (seat, queue) = start();
    let keyboard = seat
        .create_virtual_device("keyboard", DeviceCapabilities::KEYBOARD)
        .unwrap();
    seat.set_a11y(
        A11ySettings {
            sticky_keys: true,
            ..Default::default()
        },
        MouseKeysConfig::default(),
    )
    .unwrap();
    wait_for(&queue, |ev| match ev {
        Event::A11yFlagsChanged(flags)
            if flags.contains(otto_input::A11yFlags::STICKY_KEYS) =>
        {
            Some(())
        }
        _ => None,
    });

    // tapping shift latches it
    keyboard.key(KEY_LEFTSHIFT, KeyState::Pressed).unwrap();
    keyboard.key(KEY_LEFTSHIFT, KeyState::Released).unwrap();
    wait_for(&queue, |ev| match ev {
        Event::Key { key, state, .. }
            if *key == KEY_LEFTSHIFT && *state == KeyState::Released =>
        {
            Some(())
        }
        _ => None,
    });
    assert_ne!(seat.modifiers().latched, 0);

    // the latch shifts exactly the next key
    keyboard.key(KEY_A, KeyState::Pressed).unwrap();
    let keysym = wait_for(&queue, |ev| match ev {
        Event::Key { key, keysym, state, .. }
            if *key == KEY_A && *state == KeyState::Pressed =>
        {
            Some(*keysym)
        }
        _ => None,
    });
    assert_eq!(keysym, 0x41); // XKB_KEY_A

    // its release consumes the latch; the key after it is lowercase again
    keyboard.key(KEY_A, KeyState::Released).unwrap();
    wait_for(&queue, |ev| match ev {
        Event::Key { key, state, .. } if *key == KEY_A && *state == KeyState::Released => Some(()),
        _ => None,
    });
    keyboard.key(KEY_A, KeyState::Pressed).unwrap();
    let keysym = wait_for(&queue, |ev| match ev {
        Event::Key { key, keysym, state, .. }
            if *key == KEY_A && *state == KeyState::Pressed =>
        {
            Some(*keysym)
        }
        _ => None,
    });
    assert_eq!(keysym, 0x61); // XKB_KEY_a
    keyboard.key(KEY_A, KeyState::Released).unwrap();
}

#[test]
fn warp_is_visible_before_the_call_returns() {
    let (seat, queue) = start();
    seat.set_screen_extents(Some((800.0, 600.0))).unwrap();

    seat.warp_pointer(Pos::new(123.0, 45.0)).unwrap();
    assert_eq!(seat.pointer_position(), Pos::new(123.0, 45.0));

    // warps report a zero-delta motion
    let delta = wait_for(&queue, |ev| match ev {
        Event::Motion { pos, delta, .. } if *pos == Pos::new(123.0, 45.0) => Some(*delta),
        _ => None,
    });
    assert_eq!(delta, Pos::default());
}

#[test]
fn layout_queries_follow_the_keymap() {
    let (seat, _queue) = start();
    seat.set_keymap("us,de", "", None).unwrap();
    assert_eq!(seat.layouts().len(), 2);
    seat.set_layout_index(1).unwrap();
    // layout switches are applied asynchronously; poll the snapshot
    let deadline = std::time::Instant::now() + TIMEOUT;
    while seat.active_layout() != 1 {
        assert!(std::time::Instant::now() < deadline, "layout never switched");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn suspend_detaches_devices_and_resume_recovers() {
    let (seat, queue) = start();
    let device = seat
        .create_virtual_device("mouse", DeviceCapabilities::POINTER)
        .unwrap();
    let id = device.id();
    wait_for(&queue, |ev| match ev {
        Event::DeviceAdded { device, .. } if *device == id => Some(()),
        _ => None,
    });

    seat.suspend().unwrap();
    wait_for(&queue, |ev| match ev {
        Event::DeviceRemoved { device } if *device == id => Some(()),
        _ => None,
    });
    assert!(seat.is_suspended());
    assert!(seat.devices().is_empty());

    seat.resume().unwrap();
    let deadline = std::time::Instant::now() + TIMEOUT;
    while seat.is_suspended() {
        assert!(std::time::Instant::now() < deadline, "never resumed");
        std::thread::sleep(Duration::from_millis(5));
    }
}
