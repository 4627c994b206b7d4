#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Format detection, opening from each source kind, and DCX wrapping

use binder_formats::dcx::DCX_TAG;
use binder_formats::{
    Binder, BinderEntry, BinderError, BinderSource, BinderVersion, DcxCodec, DcxMagic,
    MANIFEST_FILE_NAME, detect_v3, detect_v4, open,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// Envelope of tag, two magic values and the raw payload
struct FakeDcx;

impl DcxCodec for FakeDcx {
    fn decompress(&self, data: &[u8]) -> binder_formats::Result<(Vec<u8>, DcxMagic)> {
        if data.len() < 12 || data[..4] != DCX_TAG {
            return Err(BinderError::Compression("not a fake DCX envelope".into()));
        }
        let a = i32::from_le_bytes(data[4..8].try_into().unwrap());
        let b = i32::from_le_bytes(data[8..12].try_into().unwrap());
        Ok((data[12..].to_vec(), DcxMagic(a, b)))
    }

    fn compress(&self, data: &[u8], magic: DcxMagic) -> binder_formats::Result<Vec<u8>> {
        let mut out = DCX_TAG.to_vec();
        out.extend_from_slice(&magic.0.to_le_bytes());
        out.extend_from_slice(&magic.1.to_le_bytes());
        out.extend_from_slice(data);
        Ok(out)
    }
}

fn sample(version: BinderVersion) -> Binder {
    let mut binder = match version {
        BinderVersion::V3 => Binder::new_v3("07D7R6", 0x74),
        BinderVersion::V4 => Binder::new_v4("07D7R6", 0x74),
    };
    binder
        .add_entry(BinderEntry::new(
            b"flver".to_vec(),
            Some(200),
            Some("N:\\FRPG\\data\\Model\\chr\\c5370\\c5370.flver".into()),
        ))
        .unwrap();
    binder
}

#[test]
fn bytes_detect_as_exactly_one_version() {
    let v3 = sample(BinderVersion::V3).pack().unwrap();
    let v4 = sample(BinderVersion::V4).pack().unwrap();

    assert!(detect_v3(v3.as_slice()));
    assert!(!detect_v4(v3.as_slice()));
    assert!(detect_v4(v4.as_slice()));
    assert!(!detect_v3(v4.as_slice()));

    assert_eq!(open(v3.as_slice(), None).unwrap().version(), BinderVersion::V3);
    assert_eq!(open(v4.as_slice(), None).unwrap().version(), BinderVersion::V4);
}

#[test]
fn other_data_is_unknown_format() {
    let data = b"TPF\0\0\0\0\0\0\0\0\0";
    assert!(!detect_v3(&data[..]));
    assert!(!detect_v4(&data[..]));
    assert!(matches!(
        open(&data[..], None),
        Err(BinderError::UnknownFormat)
    ));
    assert!(matches!(open(&[0u8; 0][..], None), Err(BinderError::UnknownFormat)));
}

#[test]
fn file_and_directory_sources() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("c5370.chrbnd");
    let mut binder = sample(BinderVersion::V3);
    binder.write_to_path(&file, None).unwrap();

    assert!(detect_v3(file.as_path()));
    assert!(!detect_v4(file.as_path()));
    let opened = open(file.as_path(), None).unwrap();
    assert_eq!(opened.entries(), binder.entries());

    let unpacked = temp.path().join("c5370.chrbnd.unpacked");
    opened.write_unpacked_dir(&unpacked).unwrap();
    assert!(detect_v3(unpacked.as_path()));
    assert!(detect_v3(unpacked.join(MANIFEST_FILE_NAME).as_path()));
    assert!(!detect_v4(unpacked.as_path()));

    let reopened = open(BinderSource::Path(&unpacked), None).unwrap();
    assert_eq!(reopened.entries(), binder.entries());

    // A plain directory without a manifest is not a binder
    assert!(!detect_v3(temp.path()));
    assert!(!detect_v4(temp.path()));
}

#[test]
fn dcx_round_trip_keeps_magic() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("c5370.chrbnd.dcx");

    let mut binder = sample(BinderVersion::V4);
    binder.fields.dcx_magic = Some(DcxMagic(36, 68));
    binder.write_to_path(&file, Some(&FakeDcx)).unwrap();

    let raw = std::fs::read(&file).unwrap();
    assert_eq!(&raw[..4], &DCX_TAG);
    // Detection does not look inside DCX envelopes
    assert!(!detect_v4(raw.as_slice()));

    let opened = open(file.as_path(), Some(&FakeDcx)).unwrap();
    assert_eq!(opened.fields.dcx_magic, Some(DcxMagic(36, 68)));
    assert_eq!(opened.entries(), binder.entries());
}

#[test]
fn dcx_magic_without_codec_fails_write() {
    let temp = TempDir::new().unwrap();
    let mut binder = sample(BinderVersion::V4);
    binder.fields.dcx_magic = Some(DcxMagic(36, 68));
    assert!(matches!(
        binder.write_to_path(temp.path().join("out.dcx"), None),
        Err(BinderError::UnsupportedOperation(_))
    ));
}

#[test]
fn duplicate_ids_add_with_warning() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let mut binder = sample(BinderVersion::V3);
    binder
        .add_entry(BinderEntry::new(b"other".to_vec(), Some(200), Some("c5370.anibnd".into())))
        .unwrap();
    assert_eq!(binder.entry_count(), 2);
    assert!(matches!(
        binder.entries_by_id(),
        Err(BinderError::DuplicateEntry(_))
    ));

    // Duplicate IDs survive a pack round trip
    let parsed = Binder::parse(&binder.pack().unwrap()).unwrap();
    assert_eq!(parsed.entry_count(), 2);
}
