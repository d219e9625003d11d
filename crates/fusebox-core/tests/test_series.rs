use fusebox_core::fusion::FusionKey;
use fusebox_core::series::{sort_slices, FusedSlice, RegistrationId, SeriesId, SliceDescriptor};
use ndarray::Array2;

#[test]
fn test_sort_slices_by_position() {
    let mut slices = vec![
        SliceDescriptor::new("c", 3, 5.0),
        SliceDescriptor::new("a", 1, -5.0),
        SliceDescriptor::new("b", 2, 0.0),
    ];
    sort_slices(&mut slices);
    let uids: Vec<&str> = slices.iter().map(|s| s.instance_uid.as_str()).collect();
    assert_eq!(uids, vec!["a", "b", "c"]);
}

#[test]
fn test_sort_slices_ties_break_on_instance_number() {
    let mut slices = vec![
        SliceDescriptor::new("late", 9, 1.0),
        SliceDescriptor::new("early", 4, 1.0),
    ];
    sort_slices(&mut slices);
    assert_eq!(slices[0].instance_uid, "early");
}

#[test]
fn test_fused_slice_range_and_size() {
    let data = Array2::from_shape_vec((2, 3), vec![0.5, -1.0, 2.0, 0.0, 1.0, 0.25]).unwrap();
    let slice = FusedSlice::new(7, data);
    assert_eq!(slice.slice_index, 7);
    assert_eq!((slice.height(), slice.width()), (2, 3));
    assert_eq!(slice.min, -1.0);
    assert_eq!(slice.max, 2.0);
    assert_eq!(slice.byte_len(), 24);
}

#[test]
fn test_empty_fused_slice() {
    let slice = FusedSlice::new(0, Array2::zeros((0, 0)));
    assert_eq!((slice.min, slice.max), (0.0, 0.0));
    assert_eq!(slice.byte_len(), 0);
}

#[test]
fn test_fusion_key_identity() {
    let default = FusionKey::pair(SeriesId(1), SeriesId(20));
    let explicit = FusionKey::new(
        SeriesId(1),
        SeriesId(20),
        RegistrationId::Explicit("REG-7".into()),
    );
    assert_ne!(default, explicit);
    assert_eq!(default.to_string(), "20 -> 1 (default)");
    assert_eq!(explicit.to_string(), "20 -> 1 (REG-7)");
    assert_eq!(SeriesId::from(5).to_string(), "series 5");
}
