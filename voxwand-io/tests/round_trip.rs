#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
use tempfile::tempdir;
use voxwand_algorithms::{EditorSession, RecordingSink};
use voxwand_core::{Affine, EditorConfig, GridDims, VolumeSet, VoxelGrid, VoxelKey};
use voxwand_io::{
    compress, decode, decode_any, download, encode, export_volume, load_image, ByteOrder,
    ElementType, ImageHeader, NiftiImage, NiftiVersion, VoxelBuffer, EXPORT_MIME, EXPORT_NAME,
};

fn sample_buffer(element: ElementType, n: usize) -> VoxelBuffer {
    let values: Vec<f64> = (0..n).map(|i| (i as f64) * 1.5 - 4.0).collect();
    let grid = VoxelGrid::from_vec(GridDims::new(n, 1, 1), values).unwrap();
    VoxelBuffer::from_grid(element, &grid)
}

#[test]
fn test_encode_decode_is_bit_exact() {
    let dims = GridDims::new(3, 4, 5);
    let affine = Affine::from_spacing(0.9, 0.9, 1.2).unwrap();
    for version in [NiftiVersion::One, NiftiVersion::Two] {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            for element in ElementType::ALL {
                let header = ImageHeader::create(version, order, dims, element, &affine);
                let buffer = sample_buffer(element, dims.len());
                let bytes = encode(&header, &buffer).unwrap();
                assert_eq!(bytes.len(), header.vox_offset() + buffer.byte_len());

                let image = decode(&bytes).unwrap();
                assert_eq!(image.header().raw(), header.raw());
                assert_eq!(image.data(), &buffer, "{version:?} {order:?} {element}");
                assert_eq!(image.encode().unwrap(), bytes);
            }
        }
    }
}

#[test]
fn test_header_extensions_survive() {
    let dims = GridDims::new(2, 2, 2);
    let header = ImageHeader::create(
        NiftiVersion::One,
        ByteOrder::Little,
        dims,
        ElementType::U8,
        &Affine::identity(),
    );
    // Extend the header with a 16-byte extension block and move the payload.
    let mut raw = header.raw().to_vec();
    raw[348] = 1;
    raw.extend_from_slice(&16i32.to_le_bytes());
    raw.extend_from_slice(&6i32.to_le_bytes());
    raw.extend_from_slice(b"comment\0");
    raw[108..112].copy_from_slice(&368f32.to_le_bytes());
    let mut bytes = raw.clone();
    bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

    let image = decode(&bytes).unwrap();
    assert_eq!(image.header().vox_offset(), 368);
    assert_eq!(image.header().raw(), &raw[..]);
    assert_eq!(image.data(), &VoxelBuffer::U8(vec![1, 2, 3, 4, 5, 6, 7, 8]));
    assert_eq!(image.encode().unwrap(), bytes);
}

#[test]
fn test_load_gzip_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t1.nii.gz");
    let header = ImageHeader::create(
        NiftiVersion::One,
        ByteOrder::Little,
        GridDims::new(4, 4, 4),
        ElementType::F32,
        &Affine::from_spacing(2.0, 2.0, 2.0).unwrap(),
    );
    let buffer = sample_buffer(ElementType::F32, 64);
    std::fs::write(&path, compress(&encode(&header, &buffer).unwrap()).unwrap()).unwrap();

    let image = load_image(&path).unwrap();
    assert_eq!(image.data(), &buffer);
    let grid: VoxelGrid<f32> = image.to_grid().unwrap();
    assert_eq!(grid.dims(), GridDims::new(4, 4, 4));
    assert_eq!(grid.world_of(VoxelKey::new(1, 0, 0)).x, 2.0);
}

#[test]
fn test_edit_export_and_reload() {
    let dims = GridDims::new(16, 16, 16);
    let header = ImageHeader::create(
        NiftiVersion::One,
        ByteOrder::Little,
        dims,
        ElementType::I16,
        &Affine::identity(),
    );
    let lesion_image = NiftiImage::new(header, VoxelBuffer::I16(vec![0; dims.len()])).unwrap();

    let mut volumes = VolumeSet::new(
        VoxelGrid::zeros(dims),
        lesion_image.to_grid().unwrap(),
    )
    .unwrap();
    for x in 4..8 {
        volumes.background.set(VoxelKey::new(x, 8, 8), 40.0);
    }
    let mut session =
        EditorSession::new(volumes, EditorConfig::default(), RecordingSink::new()).unwrap();
    session.select(VoxelKey::new(5, 8, 8), 30.0);
    assert_eq!(session.commit(Some(2)), 4);
    let (volumes, _) = session.into_parts();

    let blob = export_volume(&lesion_image, &volumes.lesion).unwrap();
    assert_eq!(blob.name, EXPORT_NAME);
    assert_eq!(blob.mime_type, EXPORT_MIME);

    let dir = tempdir().unwrap();
    let written = download(&blob, dir.path()).unwrap();
    assert_eq!(written, dir.path().join(EXPORT_NAME));

    let reloaded = decode_any(&std::fs::read(&written).unwrap()).unwrap();
    assert_eq!(reloaded.header(), lesion_image.header());
    let labels: VoxelGrid<u32> = reloaded.to_grid().unwrap();
    assert_eq!(labels.count_nonzero(), 4);
    assert_eq!(labels.get(VoxelKey::new(7, 8, 8)), Some(2));
}
