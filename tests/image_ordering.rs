//! Property tests for the consumption contract of an Image: every data
//! payload is delivered exactly once, in append order, and never past the
//! caller's position ceiling.

use std::convert::Infallible;
use std::sync::Arc;

use proptest::prelude::*;

use shearwater::frame::{FRAME_TYPE_DATA, FRAME_TYPE_PADDING};
use shearwater::{Image, StreamRegion};

#[derive(Clone, Debug)]
struct Entry {
    payload: Vec<u8>,
    padding: bool,
}

fn entries() -> impl Strategy<Value = Vec<Entry>> {
    let entry = (proptest::collection::vec(any::<u8>(), 0..64), any::<bool>())
        .prop_map(|(payload, padding)| Entry { payload, padding });
    proptest::collection::vec(entry, 1..32)
}

fn seed(entries: &[Entry]) -> (Arc<StreamRegion>, Vec<Vec<u8>>) {
    let region = Arc::new(StreamRegion::new(16 * 1024));
    let mut expected = Vec::new();
    for entry in entries {
        let frame_type = if entry.padding { FRAME_TYPE_PADDING } else { FRAME_TYPE_DATA };
        region
            .append(frame_type, 7, 10, &entry.payload)
            .expect("region has room");
        if !entry.padding {
            expected.push(entry.payload.clone());
        }
    }
    (region, expected)
}

proptest! {
    /// Every data payload arrives exactly once, in append order, no matter
    /// how small the per-poll fragment budget is.
    #[test]
    fn chunked_polls_deliver_everything_once_in_order(
        entries in entries(),
        fragment_limit in 1usize..8,
    ) {
        let (region, expected) = seed(&entries);
        let image = Image::new(1, 7, 42, Arc::clone(&region));

        let mut payloads = Vec::new();
        while image.position() < region.committed_position() {
            image
                .poll::<Infallible, _>(
                    &mut |buf, offset, length, _frame| {
                        payloads.push(buf.get_bytes(offset, length));
                        Ok(())
                    },
                    fragment_limit,
                )
                .unwrap();
        }

        prop_assert_eq!(payloads, expected);
        prop_assert_eq!(image.position(), region.committed_position());
    }

    /// Delivery positions are strictly increasing and always equal the
    /// Image's published position at the instant of the callback.
    #[test]
    fn positions_are_strictly_increasing_and_published_before_delivery(
        entries in entries(),
    ) {
        let (region, _) = seed(&entries);
        let image = Arc::new(Image::new(1, 7, 42, Arc::clone(&region)));

        let mut last = 0i64;
        let observer = Arc::clone(&image);
        image
            .poll::<Infallible, _>(
                &mut |_, _, _, frame| {
                    assert!(frame.position() > last, "positions must advance");
                    assert_eq!(observer.position(), frame.position());
                    last = frame.position();
                    Ok(())
                },
                usize::MAX,
            )
            .unwrap();
        prop_assert_eq!(image.position(), region.committed_position());
    }

    /// A bounded poll never advances past the ceiling, and raising the
    /// ceiling afterwards releases the remainder with nothing lost or
    /// repeated.
    #[test]
    fn bounded_poll_respects_any_ceiling(
        entries in entries(),
        ceiling_fraction in 0.0f64..=1.0,
    ) {
        let (region, expected) = seed(&entries);
        let image = Image::new(1, 7, 42, Arc::clone(&region));
        let committed = region.committed_position();
        let ceiling = (committed as f64 * ceiling_fraction) as i64;

        let mut payloads = Vec::new();
        let mut handler = |buf: &Arc<shearwater::RegionBuffer>, offset: usize, length: usize, _: &shearwater::FrameContext| {
            payloads.push(buf.get_bytes(offset, length));
            Ok::<(), Infallible>(())
        };

        image.bounded_poll(&mut handler, ceiling, usize::MAX).unwrap();
        prop_assert!(image.position() <= ceiling);

        image.bounded_poll(&mut handler, committed, usize::MAX).unwrap();
        prop_assert_eq!(payloads, expected);
        prop_assert_eq!(image.position(), committed);
    }
}

#[test]
fn padding_only_streams_advance_to_the_tail_without_callbacks() {
    let (region, expected) = seed(&[
        Entry { payload: vec![1, 2, 3], padding: true },
        Entry { payload: vec![], padding: true },
    ]);
    assert!(expected.is_empty());
    let image = Image::new(1, 7, 42, Arc::clone(&region));
    let read = image
        .poll::<Infallible, _>(&mut |_, _, _, _| panic!("padding delivered"), 4)
        .unwrap();
    assert_eq!(read, 0);
    assert_eq!(image.position(), region.committed_position());
}
