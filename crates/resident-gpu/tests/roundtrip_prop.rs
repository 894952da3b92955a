mod common;

use common::harness;
use proptest::prelude::*;
use resident_gpu::resident_format::{ArrayData, DataType, DeviceCapabilities};
use resident_gpu::{ResidentArray, ResidentArrayDescriptor};

/// Maps raw words onto values the declared type holds exactly. Floats stay on a half-step grid
/// within [-1024, 1024) so binary16 storage is lossless too.
fn host_values(ty: DataType, raw: &[u32]) -> Vec<f64> {
    raw.iter()
        .map(|&r| match ty.range() {
            Some((min, max)) => min + (f64::from(r) % (max - min + 1.0)),
            None => (f64::from(r % 4096) - 2048.0) / 2.0,
        })
        .collect()
}

fn data_type() -> impl Strategy<Value = DataType> {
    proptest::sample::select(DataType::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn host_arrays_survive_upload_and_readback(
        ty in data_type(),
        components in 1u8..=4,
        length in 1u32..40,
        raw in proptest::collection::vec(any::<u32>(), 160),
    ) {
        let h = harness(DeviceCapabilities::gles3());
        let values = host_values(ty, &raw[..length as usize * components as usize]);
        let data = ArrayData::from_numbers(ty, &values).unwrap();

        let mut array = ResidentArray::new(
            &h.ctx,
            ResidentArrayDescriptor::new("prop", ty, components, length).writable(true),
        )
        .unwrap();
        array.set_from_host(&data, false).unwrap();
        prop_assert_eq!(array.read_to_host().unwrap(), data);
        array.dispose().unwrap();
        prop_assert!(h.take_errors().is_empty());
    }

    #[test]
    fn ring_index_follows_advance_count(buffers in 1u32..6, advances in 0u32..20) {
        let h = harness(DeviceCapabilities::gles3());
        let mut array = ResidentArray::new(
            &h.ctx,
            ResidentArrayDescriptor::new("ring", DataType::Float, 1, 4u32)
                .writable(true)
                .with_buffer_count(buffers),
        )
        .unwrap();
        for _ in 0..advances {
            array.advance().unwrap();
        }
        let index = advances % buffers;
        prop_assert_eq!(array.buffer_index(), index);
        prop_assert_eq!(array.current_state().unwrap(), array.state_at(index).unwrap());
        if buffers > 1 {
            let last = (index + buffers - 1) % buffers;
            prop_assert_eq!(array.last_state().unwrap(), array.state_at(last).unwrap());
        } else {
            prop_assert!(array.last_state().is_err());
        }
        array.dispose().unwrap();
    }
}
