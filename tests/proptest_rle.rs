//! Property tests for the brush mask RLE codec.

use proptest::prelude::*;

use lsconv::brush::{decode, encode, MaskGrid};

fn arbitrary_grid() -> impl Strategy<Value = MaskGrid> {
    (1u32..=48, 1u32..=48).prop_flat_map(|(width, height)| {
        prop::collection::vec(any::<bool>(), (width * height) as usize)
            .prop_map(move |pixels| MaskGrid::from_pixels(width, height, pixels))
    })
}

proptest! {
    #[test]
    fn decode_inverts_encode(grid in arbitrary_grid()) {
        let rle = encode(&grid);
        let decoded = decode(&rle, grid.width, grid.height).expect("roundtrip decode");
        prop_assert_eq!(decoded, grid);
    }

    #[test]
    fn truncated_streams_never_decode(grid in arbitrary_grid()) {
        let rle = encode(&grid);
        // Dropping the last byte must always be detected, never mis-decode.
        prop_assert!(decode(&rle[..rle.len() - 1], grid.width, grid.height).is_err());
    }

    #[test]
    fn wrong_dimensions_are_rejected(grid in arbitrary_grid()) {
        let rle = encode(&grid);
        prop_assert!(decode(&rle, grid.width + 1, grid.height + 1).is_err());
    }
}
