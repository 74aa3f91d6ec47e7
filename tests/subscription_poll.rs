//! Subscription behavior under concurrent administrative mutation.

mod fixtures;

use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use shearwater::{Image, StreamRegion, Subscription};

use fixtures::driver::StubConductor;

fn subscription(conductor: &Arc<StubConductor>) -> Subscription {
    Subscription::new(Arc::clone(conductor) as _, "shm:stream", 900, 10, 3)
}

fn image_with_fragments(session_id: i32, correlation_id: i64, fragments: usize) -> Arc<Image> {
    let region = Arc::new(StreamRegion::new(8 * 1024));
    for _ in 0..fragments {
        region
            .append_data(session_id, 10, &[session_id as u8; 16])
            .expect("room");
    }
    Arc::new(Image::new(900, session_id, correlation_id, region))
}

#[test]
fn in_flight_poll_completes_on_its_snapshot() {
    let conductor = Arc::new(StubConductor::default());
    let sub = subscription(&conductor);
    sub.add_image(image_with_fragments(1, 1, 2));
    sub.add_image(image_with_fragments(2, 2, 2));

    // Remove an image from inside the handler, mid-poll. The in-flight
    // scan still walks the snapshot it loaded: all four fragments arrive.
    let mut sessions = Vec::new();
    let read = sub
        .poll::<Infallible, _>(
            &mut |_, _, _, frame| {
                if sessions.is_empty() {
                    sub.remove_image(2);
                }
                sessions.push(frame.session_id());
                Ok(())
            },
            8,
        )
        .expect("poll");
    assert_eq!(read, 4);
    assert!(sessions.contains(&2));

    // The next poll observes the updated set.
    assert_eq!(sub.image_count(), 1);
    let read = sub
        .poll::<Infallible, _>(&mut |_, _, _, _| Ok(()), 8)
        .expect("poll");
    assert_eq!(read, 0);
}

#[test]
fn poller_survives_concurrent_add_and_remove() {
    let conductor = Arc::new(StubConductor::default());
    let sub = Arc::new(subscription(&conductor));
    sub.add_image(image_with_fragments(0, 0, 64));

    let mutator = {
        let sub = Arc::clone(&sub);
        thread::spawn(move || {
            for round in 1..200i64 {
                sub.add_image(image_with_fragments(round as i32, round, 0));
                sub.remove_image(round);
            }
        })
    };

    let mut delivered = 0usize;
    while delivered < 64 {
        delivered += sub
            .poll::<Infallible, _>(&mut |_, _, _, _| Ok(()), 4)
            .expect("poll");
    }
    mutator.join().expect("mutator");
    assert_eq!(delivered, 64);
}

#[test]
fn concurrent_close_releases_exactly_once() {
    let conductor = Arc::new(StubConductor::default());
    let sub = Arc::new(subscription(&conductor));
    sub.add_image(image_with_fragments(1, 1, 0));

    let closers: Vec<_> = (0..4)
        .map(|_| {
            let sub = Arc::clone(&sub);
            thread::spawn(move || sub.close().is_ok())
        })
        .collect();
    for closer in closers {
        assert!(closer.join().expect("closer"));
    }

    assert!(sub.is_closed());
    assert_eq!(conductor.releases.load(Ordering::SeqCst), 1);
    // The detached image was lingered, not dropped.
    assert_eq!(conductor.lingered.lock().expect("lingered").len(), 1);
}

#[test]
fn is_connected_tracks_open_images() {
    let conductor = Arc::new(StubConductor::default());
    let sub = subscription(&conductor);
    assert!(!sub.is_connected());

    let image = image_with_fragments(1, 1, 0);
    sub.add_image(Arc::clone(&image));
    assert!(sub.is_connected());

    image.close();
    assert!(!sub.is_connected());
}
