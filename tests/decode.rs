use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

mod support;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};

use xmlrpc_mamont::xml::{self, Base64, Decoder, Slot, Value};
use xmlrpc_mamont::{DecodeStruct, Error};

use support::Latin1;

#[derive(Default, Debug, PartialEq)]
struct Book {
    title: String,
    amount: i32,
}

DecodeStruct!(Book, title => "Title", amount => "Amount");

#[derive(Default, Debug, PartialEq)]
struct Ledger {
    owner: String,
    books: Vec<Book>,
    audited: Option<DateTime<Utc>>,
    notes: String,
}

DecodeStruct!(Ledger, owner, books, audited);

fn decoded<T: xml::Decode + Default>(document: &str) -> T {
    let mut value = T::default();
    xml::decode(document.as_bytes(), &mut value).expect("cannot decode");
    value
}

fn decode_err<T: xml::Decode + Default>(document: &str) -> Error {
    let mut value = T::default();
    xml::decode(document.as_bytes(), &mut value).expect_err("decode should fail")
}

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).single().expect("valid date")
}

#[test]
fn decodes_integers() {
    assert_eq!(decoded::<i32>("<value><int>100</int></value>"), 100);
    assert_eq!(decoded::<i32>("<value><i4>389451</i4></value>"), 389451);
    assert_eq!(decoded::<i64>("<value><i8>45659074</i8></value>"), 45659074);
    assert_eq!(decoded::<u16>("<value><int>65535</int></value>"), 65535);
    assert_eq!(decoded::<i64>("<value><int> -42 </int></value>"), -42);
}

#[test]
fn empty_integer_resets_destination() {
    let mut value = 17i32;
    xml::decode(b"<value><int></int></value>", &mut value).expect("cannot decode");
    assert_eq!(value, 0);

    let mut value = 17i32;
    xml::decode(b"<value/>", &mut value).expect("cannot decode");
    assert_eq!(value, 0);
}

#[test]
fn i8_only_fits_64_bit_destinations() {
    let err = decode_err::<i32>("<value><i8>5</i8></value>");
    assert!(matches!(err, Error::TypeMismatch { wire: "i8", target: "i32" }), "{err:?}");
}

#[test]
#[cfg(target_pointer_width = "64")]
fn pointer_sized_integers_accept_i8() {
    assert_eq!(decoded::<isize>("<value><i8>9223372036854775807</i8></value>"), isize::MAX);
    assert_eq!(decoded::<usize>("<value><i8>5000000000</i8></value>"), 5_000_000_000);
}

#[test]
fn integer_overflow_is_a_parse_error() {
    let err = decode_err::<i8>("<value><int>300</int></value>");
    assert!(matches!(err, Error::Parse(_)), "{err:?}");

    let err = decode_err::<u32>("<value><int>-1</int></value>");
    assert!(matches!(err, Error::Parse(_)), "{err:?}");

    let err = decode_err::<i64>("<value><int>12abc</int></value>");
    assert!(matches!(err, Error::Parse(_)), "{err:?}");
}

#[test]
fn decodes_strings() {
    assert_eq!(
        decoded::<String>("<value><string>Once upon a time</string></value>"),
        "Once upon a time"
    );
    assert_eq!(decoded::<String>("<value>Once upon a time</value>"), "Once upon a time");
    assert_eq!(
        decoded::<String>("<value><string>Mike &amp; Mick &lt;London, UK&gt;</string></value>"),
        "Mike & Mick <London, UK>"
    );
    assert_eq!(decoded::<String>("<value><string/></value>"), "");
    assert_eq!(decoded::<String>("<value><string><![CDATA[a < b]]></string></value>"), "a < b");
}

#[test]
fn base64_is_passed_through_as_text() {
    let document = "<value><base64>T25jZSB1cG9uIGEgdGltZQ==</base64></value>";
    assert_eq!(decoded::<String>(document), "T25jZSB1cG9uIGEgdGltZQ==");
    assert_eq!(decoded::<Base64>(document), Base64("T25jZSB1cG9uIGEgdGltZQ==".to_string()));
    assert_eq!(decoded::<Value>(document), Value::Base64("T25jZSB1cG9uIGEgdGltZQ==".to_string()));
}

#[test]
fn decodes_booleans() {
    assert!(decoded::<bool>("<value><boolean>1</boolean></value>"));
    assert!(!decoded::<bool>("<value><boolean>0</boolean></value>"));

    let err = decode_err::<bool>("<value><boolean>true</boolean></value>");
    assert!(matches!(err, Error::Parse(_)), "{err:?}");
}

#[test]
fn decodes_doubles() {
    assert_eq!(decoded::<f32>("<value><double>12.134</double></value>"), 12.134);
    assert_eq!(decoded::<f32>("<value><double>-12.134</double></value>"), -12.134);
    assert_eq!(decoded::<f64>("<value><double>738777323.0</double></value>"), 738777323.0);
}

#[test]
fn decodes_every_datetime_spelling() {
    let cases = [
        ("20131209T21:00:12", 0),
        ("20131209T21:00:12Z", 0),
        ("20131209T21:00:12-01:00", -3600),
        ("20131209T21:00:12+01:00", 3600),
        ("2013-12-09T21:00:12", 0),
        ("2013-12-09T21:00:12Z", 0),
        ("2013-12-09T21:00:12-01:00", -3600),
        ("2013-12-09T21:00:12+01:00", 3600),
    ];

    for (text, offset) in cases {
        let document = format!("<value><dateTime.iso8601>{text}</dateTime.iso8601></value>");
        let zone = FixedOffset::east_opt(offset).expect("valid offset");
        let expected = zone.with_ymd_and_hms(2013, 12, 9, 21, 0, 12).single().expect("valid date");

        let value: DateTime<FixedOffset> = decoded(&document);
        assert_eq!(value, expected, "{text}");
        assert_eq!(value.offset(), &zone, "{text}");

        let value: DateTime<Utc> = decoded(&document);
        assert_eq!(value, expected.with_timezone(&Utc), "{text}");
    }
}

#[test]
fn unknown_datetime_spelling_is_a_parse_error() {
    let err = decode_err::<DateTime<Utc>>(
        "<value><dateTime.iso8601>2013/12/09 21:00</dateTime.iso8601></value>",
    );
    assert!(matches!(err, Error::Parse(_)), "{err:?}");
}

#[test]
fn decodes_arrays() {
    let document = "<value><array><data><value><int>1</int></value><value><int>5</int></value>\
                    <value><int>7</int></value></data></array></value>";
    assert_eq!(decoded::<Vec<i32>>(document), vec![1, 5, 7]);

    let mut existing = vec![9, 9, 9, 9, 9];
    xml::decode(document.as_bytes(), &mut existing).expect("cannot decode");
    assert_eq!(existing, vec![1, 5, 7]);

    let document = "<value><array><data><value><string>A</string></value>\
                    <value><int>5</int></value></data></array></value>";
    assert_eq!(
        decoded::<Value>(document),
        Value::Array(vec![Value::String("A".to_string()), Value::Int(5)])
    );
    assert_eq!(decoded::<Vec<String>>("<value><array><data/></array></value>"), Vec::<String>::new());
}

#[test]
fn fresh_sequences_replace_existing_elements() {
    let document = "<value><array><data><value><struct><member><name>Title</name>\
                    <value>New</value></member></struct></value></data></array></value>";

    let mut books = vec![Book { title: "Old".to_string(), amount: 5 }, Book::default()];
    xml::decode(document.as_bytes(), &mut books).expect("cannot decode");
    assert_eq!(books, vec![Book { title: "New".to_string(), amount: 0 }]);
}

#[test]
fn failed_sequence_decode_keeps_previous_elements() {
    let mut numbers = vec![4, 2];
    let err = xml::decode(
        b"<value><array><data><value><int>1</int></value><value>x</value></data></array>\
          </value>",
        &mut numbers,
    )
    .expect_err("should mismatch");
    assert!(matches!(err, Error::TypeMismatch { wire: "string", .. }), "{err:?}");
    assert_eq!(numbers, vec![4, 2]);
}

#[test]
fn array_element_mismatch_is_reported() {
    let err = decode_err::<Vec<i32>>(
        "<value><array><data><value><int>1</int></value><value><string>x</string></value>\
         </data></array></value>",
    );
    assert!(matches!(err, Error::TypeMismatch { wire: "string", .. }), "{err:?}");
}

#[test]
fn fills_existing_slots_and_appends_the_rest() {
    let document = r#"
<value>
  <array>
    <data>
      <value><int>234</int></value>
      <value><boolean>1</boolean></value>
      <value><string>Hello World</string></value>
      <value><string>Extra Value</string></value>
    </data>
  </array>
</value>"#;

    let mut v1 = 0i32;
    let mut v2 = false;
    let mut v3 = String::new();
    let mut slots = vec![Slot::Bound(&mut v1), Slot::Bound(&mut v2), Slot::Bound(&mut v3)];
    xml::decode(document.as_bytes(), &mut slots).expect("cannot decode");

    assert_eq!(slots.len(), 4);
    match &slots[3] {
        Slot::Value(value) => assert_eq!(value.as_str(), Some("Extra Value")),
        Slot::Bound(_) => panic!("expected an appended value"),
    }
    drop(slots);

    assert_eq!(v1, 234);
    assert!(v2);
    assert_eq!(v3, "Hello World");
}

#[test]
fn empty_value_resets_every_slot() {
    let mut number = 7i32;
    let mut text = "stale".to_string();
    let mut slots =
        vec![Slot::Bound(&mut number), Slot::Bound(&mut text), Slot::Value(Value::Int(1))];
    xml::decode(b"<value/>", &mut slots).expect("cannot decode");

    assert_eq!(slots.len(), 3);
    assert!(matches!(&slots[2], Slot::Value(Value::Nil)));
    drop(slots);

    assert_eq!(number, 0);
    assert_eq!(text, "");
}

#[test]
fn decodes_structs_by_wire_name() {
    let document = "<value><struct><member><name>Title</name><value><string>War and Piece</string>\
                    </value></member><member><name>Amount</name><value><int>20</int></value>\
                    </member><member><name>Unknown</name><value><int>1</int></value></member>\
                    </struct></value>";
    assert_eq!(decoded::<Book>(document), Book { title: "War and Piece".to_string(), amount: 20 });
}

#[test]
fn unlisted_fields_are_invisible() {
    let document = "<value><struct><member><name>owner</name><value>Ann</value></member>\
                    <member><name>notes</name><value><string>secret</string></value></member>\
                    <member><name>books</name><value><array><data><value><struct><member>\
                    <name>Title</name><value>Emma</value></member></struct></value></data>\
                    </array></value></member></struct></value>";

    let mut ledger = Ledger { notes: "kept".to_string(), ..Default::default() };
    xml::decode(document.as_bytes(), &mut ledger).expect("cannot decode");

    assert_eq!(ledger.owner, "Ann");
    assert_eq!(ledger.notes, "kept");
    assert_eq!(ledger.books, vec![Book { title: "Emma".to_string(), amount: 0 }]);
    assert_eq!(ledger.audited, None);
}

#[test]
fn optional_fields_follow_the_wire() {
    let document = "<value><struct><member><name>audited</name><value><dateTime.iso8601>\
                    20091110T23:00:00</dateTime.iso8601></value></member></struct></value>";
    let ledger: Ledger = decoded(document);
    assert_eq!(ledger.audited, Some(utc(2009, 11, 10, 23, 0, 0)));

    let mut ledger = Ledger { audited: Some(utc(2000, 1, 1, 0, 0, 0)), ..Default::default() };
    xml::decode(
        b"<value><struct><member><name>audited</name><value/></member></struct></value>",
        &mut ledger,
    )
    .expect("cannot decode");
    assert_eq!(ledger.audited, None);
}

#[test]
fn decodes_structs_into_maps() {
    let document = "<value><struct><member><name>Name</name><value><string>John Smith</string>\
                    </value></member></struct></value>";

    let map: HashMap<String, String> = decoded(document);
    assert_eq!(map.get("Name").map(String::as_str), Some("John Smith"));

    let mut map = BTreeMap::from([("Stale".to_string(), Value::Int(1))]);
    xml::decode(document.as_bytes(), &mut map).expect("cannot decode");
    assert_eq!(map, BTreeMap::from([("Name".to_string(), Value::from("John Smith"))]));
}

#[test]
fn empty_struct_is_an_empty_map() {
    let value: Value = decoded("<value><struct></struct></value>");
    assert_eq!(value, Value::Struct(BTreeMap::new()));
}

#[test]
fn repeated_member_names_keep_the_last() {
    let value: Value = decoded(
        "<value><struct><member><name>a</name><value><int>1</int></value></member>\
         <member><name>a</name><value><int>2</int></value></member></struct></value>",
    );
    assert_eq!(value.get("a"), Some(&Value::Int(2)));
}

#[test]
fn reports_type_mismatches() {
    let err = decode_err::<String>("<value><int>100</int></value>");
    assert!(matches!(err, Error::TypeMismatch { wire: "int", .. }), "{err:?}");

    let err = decode_err::<i32>("<value><string>hello</string></value>");
    assert!(matches!(err, Error::TypeMismatch { wire: "string", .. }), "{err:?}");

    let err = decode_err::<String>("<value><boolean>1</boolean></value>");
    assert!(matches!(err, Error::TypeMismatch { wire: "boolean", .. }), "{err:?}");

    let err = decode_err::<Book>("<value><array><data></data></array></value>");
    assert!(matches!(err, Error::TypeMismatch { wire: "array", target: "Book" }), "{err:?}");
}

#[test]
fn missing_value_leaves_destination_untouched() {
    let mut value = "unchanged".to_string();
    xml::decode(b"<methodResponse><params/></methodResponse>", &mut value)
        .expect("cannot decode");
    assert_eq!(value, "unchanged");
}

#[test]
fn discarding_destination_accepts_anything() {
    let mut nothing = ();
    xml::decode(b"<value><struct></struct></value>", &mut nothing).expect("cannot decode");
}

#[test]
fn rejects_malformed_documents() {
    for document in [
        "<value><int>1</int>",
        "<value><foo>1</foo></value>",
        "<value><struct><member><value>1</value></member></struct></value>",
        "<value><array><value>1</value></array></value>",
        "<value><int>1</string></value>",
    ] {
        let err = decode_err::<Value>(document);
        assert!(matches!(err, Error::Parse(_)), "{document}: {err:?}");
    }
}

#[test]
fn limits_nesting_depth() {
    let depth = 300;
    let document = format!(
        "{}<value><int>1</int></value>{}",
        "<value><array><data>".repeat(depth),
        "</data></array></value>".repeat(depth)
    );
    let err = decode_err::<Value>(&document);
    assert!(matches!(err, Error::Parse(_)), "{err:?}");

    let depth = 100;
    let document = format!(
        "{}<value><int>1</int></value>{}",
        "<value><array><data>".repeat(depth),
        "</data></array></value>".repeat(depth)
    );
    let _: Value = decoded(&document);
}

#[test]
fn decodes_declared_charsets_through_the_resolver() {
    let mut document = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><value><string>".to_vec();
    document.extend_from_slice(&[0x47, 0x72, 0xFC, 0xDF, 0x65]);
    document.extend_from_slice(b"</string></value>");

    let decoder = Decoder::with_charset_reader(Arc::new(Latin1));
    let mut text = String::new();
    decoder.decode(&document, &mut text).expect("cannot decode");
    assert_eq!(text, "Grüße");

    let err = Decoder::default().decode(&document, &mut text).expect_err("no resolver");
    assert!(matches!(err, Error::Parse(_)), "{err:?}");

    let document = b"<?xml version=\"1.0\" encoding=\"cp1251\"?><value>x</value>";
    let err = decoder.decode(document, &mut text).expect_err("unsupported charset");
    assert!(matches!(err, Error::Parse(_)), "{err:?}");
}

#[test]
fn utf8_declaration_needs_no_resolver() {
    let document = "<?xml version=\"1.0\" encoding=\"utf-8\"?><value><string>Толстой</string></value>";
    assert_eq!(decoded::<String>(document), "Толстой");
}
