use emx_mpjson::{Base64Mode, BinaryReader, ContinuousMode, Decoder, Encoder, Error, Options, Value};
use proptest::prelude::*;

/// MessagePack -> JSON -> MessagePack, returning the final bytes
fn round_trip(packed: &[u8], options: &Options) -> Vec<u8> {
    let json = Decoder::new(options.clone()).to_json(packed).unwrap();
    let mut repacked = Vec::new();
    Encoder::new(options.clone())
        .convert(json.as_bytes(), &mut repacked)
        .unwrap();
    repacked
}

fn read(packed: &[u8]) -> Value {
    Decoder::default()
        .read_value(&mut BinaryReader::new(packed))
        .unwrap()
}

fn no_tag_prefix(s: &String) -> bool {
    !s.starts_with("base64:") && !s.starts_with("ext:")
}

fn strict_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int64),
        any::<f64>().prop_filter("finite", |f| f.is_finite()).prop_map(Value::Float64),
        ".*".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(".*", inner, 0..6).prop_map(|m| {
                Value::Map(m.into_iter().map(|(k, v)| (Value::String(k), v)).collect())
            }),
        ]
    })
}

fn tagged_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<i64>().prop_map(Value::Int64),
        ".*".prop_filter("tag prefix", no_tag_prefix).prop_map(Value::String),
        prop::collection::vec(any::<u8>(), 0..24).prop_map(Value::Bin),
        (any::<i8>(), prop::collection::vec(any::<u8>(), 0..24)).prop_map(|(t, d)| Value::Ext(t, d)),
    ];
    leaf.prop_recursive(3, 32, 5, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..5).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..5).prop_map(|m| {
                Value::Map(m.into_iter().map(|(k, v)| (Value::String(k), v)).collect())
            }),
        ]
    })
}

proptest! {
    #[test]
    fn prop_strict_values_round_trip(value in strict_value()) {
        let options = Options::new();
        let packed = Encoder::new(options.clone()).encode_value(&value).unwrap();
        let repacked = round_trip(&packed, &options);
        prop_assert_eq!(read(&repacked), value);
        prop_assert_eq!(repacked, packed);
    }

    #[test]
    fn prop_tagged_values_round_trip(value in tagged_value()) {
        let options = Options::new().with_base64(Base64Mode::Prefixed);
        let packed = Encoder::new(options.clone()).encode_value(&value).unwrap();
        let repacked = round_trip(&packed, &options);
        prop_assert_eq!(read(&repacked), value);
    }
}

#[test]
fn test_empty_bin_and_ext_round_trip() {
    let options = Options::new().with_base64(Base64Mode::Prefixed);
    let value = Value::Array(vec![Value::Bin(vec![]), Value::Ext(-128, vec![]), Value::Ext(127, vec![0])]);
    let packed = Encoder::new(options.clone()).encode_value(&value).unwrap();
    assert_eq!(read(&round_trip(&packed, &options)), value);
}

#[test]
fn test_detection_is_idempotent_but_lossy() {
    let to_bin = Encoder::new(Options::new().with_base64_min_len(8));
    let value = to_bin.parse(br#""SGVsbG8gV29ybGQ=""#).unwrap();
    // The string was really text, but now it is bytes
    assert_eq!(value, Value::Bin(b"Hello World".to_vec()));

    let packed = to_bin.encode_value(&value).unwrap();
    let back = Decoder::new(Options::new().with_base64(Base64Mode::Unprefixed))
        .to_json(&packed)
        .unwrap();
    assert_eq!(back, r#""SGVsbG8gV29ybGQ=""#);
}

#[test]
fn test_strict_mode_rejects_bin_debug_shows_size() {
    let packed = [0x91, 0xC4, 0x03, 0x01, 0x02, 0x03];

    let err = Decoder::default().to_json(&packed).unwrap_err();
    assert!(matches!(err, Error::Data { .. }));

    let shown = Decoder::default().with_debug(true).to_json(&packed).unwrap();
    assert!(shown.contains("size:3"));
    assert!(serde_json::from_str::<serde_json::Value>(&shown).is_err());
}

#[test]
fn test_non_string_key_rejected_unless_debug() {
    let packed = [0x81, 0xC3, 0x01];

    let err = Decoder::default().to_json(&packed).unwrap_err();
    assert!(err.is_data());
    assert!(err.to_string().contains("map key is not a string"));

    let shown = Decoder::default().with_debug(true).to_json(&packed).unwrap();
    assert_eq!(shown, "{\n  true: 1\n}\n");
}

#[test]
fn test_continuous_boundary() {
    let decoder = Decoder::default().with_continuous(ContinuousMode::Undelimited);

    let mut out = Vec::new();
    assert_eq!(decoder.convert(&[0x07, 0x08][..], &mut out).unwrap(), 2);
    let tokens: Vec<&str> = std::str::from_utf8(&out).unwrap().split_whitespace().collect();
    assert_eq!(tokens, vec!["7", "8"]);

    // A complete document followed by half a uint16
    let err = decoder.convert(&[0x07, 0xCD, 0x01][..], Vec::new()).unwrap_err();
    assert!(err.is_grammar());
}

#[test]
fn test_u64_max_survives_round_trip() {
    let options = Options::new();
    let packed = Encoder::default().encode_value(&Value::UInt64(u64::MAX)).unwrap();

    let json = Decoder::default().to_json(&packed).unwrap();
    assert_eq!(json, "18446744073709551615");

    let repacked = round_trip(&packed, &options);
    assert_eq!(read(&repacked), Value::UInt64(u64::MAX));
}

#[test]
fn test_key_order_and_duplicates_preserved_when_streaming() {
    let packed = [0x83, 0xA1, b'b', 0x01, 0xA1, b'a', 0x02, 0xA1, b'b', 0x03];
    assert_eq!(Decoder::default().to_json(&packed).unwrap(), r#"{"b":1,"a":2,"b":3}"#);
}

#[test]
fn test_duplicate_keys_survive_round_trip() {
    let packed = [0x83, 0xA1, b'b', 0x01, 0xA1, b'a', 0x02, 0xA1, b'b', 0x03];
    assert_eq!(round_trip(&packed, &Options::new()), packed);
}
