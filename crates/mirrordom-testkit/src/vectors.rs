//! Golden test vectors for the diff record wire form.
//!
//! Each vector diffs a `before` page against an `after` page and pins the
//! exact JSON a broadcaster would send. A viewer written against these
//! vectors decodes the same records.

use mirrordom_core::{diff, DiffRecord, Document, PropertyTable, Snapshot};

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Page the snapshot is taken from.
    pub before: &'static str,
    /// Live page diffed against the snapshot.
    pub after: &'static str,
    /// Expected records, as JSON.
    pub expected: &'static str,
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "unchanged page",
            before: "<html><head/><body><p>a</p></body></html>",
            after: "<html><head/><body><p>a</p></body></html>",
            expected: "[]",
        },
        GoldenVector {
            name: "append list item",
            before: "<html><head/><body><ul><li>a</li><li>b</li></ul></body></html>",
            after: "<html><head/><body><ul><li>a</li><li>b</li><li>c</li></ul></body></html>",
            expected: r#"[["node","html",[1,0,2],"<li>c</li>",null,[]]]"#,
        },
        GoldenVector {
            name: "remove middle list item",
            before: "<html><head/><body><ul><li>a</li><li>b</li><li>c</li></ul></body></html>",
            after: "<html><head/><body><ul><li>a</li><li>c</li></ul></body></html>",
            expected: r#"[["text","html",[1,0,1,0],"c",null],["deleted","html",[1,0,2]]]"#,
        },
        GoldenVector {
            name: "edit text",
            before: "<html><head/><body><p>old</p></body></html>",
            after: "<html><head/><body><p>new</p></body></html>",
            expected: r#"[["text","html",[1,0,0],"new",null]]"#,
        },
        GoldenVector {
            name: "change and remove attributes",
            before: r#"<html><head/><body><div id="a" title="t"/></body></html>"#,
            after: r#"<html><head/><body><div id="b"/></body></html>"#,
            expected: r#"[["attribs","html",[1,0],{"id":"b"},["title"]]]"#,
        },
        GoldenVector {
            name: "replace run with trailing text",
            before: "<html><head/><body><p>a</p><div/></body></html>",
            after: "<html><head/><body><p>a</p><span>s</span>tail</body></html>",
            expected: r#"[["node","html",[1,1],"<span>s</span>","tail",[]]]"#,
        },
        GoldenVector {
            name: "ignored nodes do not shift paths",
            before: "<html><head/><body><p>a</p></body></html>",
            after: "<html><head><title>t</title></head><body><script>x()</script><p>b</p></body></html>",
            expected: r#"[["text","html",[1,0,0],"b",null]]"#,
        },
    ]
}

/// Diff the vector's pages and return the records.
pub fn diff_vector(vector: &GoldenVector) -> Vec<DiffRecord> {
    let parse = |markup: &str| {
        Document::parse(markup).unwrap_or_else(|e| panic!("vector {}: {}", vector.name, e))
    };
    let before = parse(vector.before);
    let after = parse(vector.after);
    let mut table = PropertyTable::new();
    let snapshot = Snapshot::capture(&before, &mut table);
    diff(&after, &snapshot, &mut table).records().to_vec()
}

/// Verify all golden vectors against the differ.
///
/// Returns `(name, matches, actual_json)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let records = diff_vector(v);
            let actual = serde_json::to_value(&records).unwrap_or_default();
            let expected: serde_json::Value =
                serde_json::from_str(v.expected).unwrap_or_default();
            (v.name.to_string(), actual == expected, actual.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_match() {
        for (name, matches, actual) in verify_all_vectors() {
            assert!(matches, "vector {:?} produced {}", name, actual);
        }
    }

    #[test]
    fn test_vectors_decode_to_same_records() {
        for vector in all_vectors() {
            let records = diff_vector(&vector);
            let decoded: Vec<DiffRecord> = serde_json::from_str(vector.expected).unwrap();
            assert_eq!(decoded, records, "vector {:?}", vector.name);
        }
    }

    #[test]
    fn test_vectors_apply_to_before() {
        for vector in all_vectors() {
            let mut mirror = Document::parse(vector.before).unwrap();
            mirrordom_core::apply_diffs(&mut mirror, &diff_vector(&vector)).unwrap();
            let live = Document::parse(vector.after).unwrap();
            assert_eq!(
                mirrordom_sync::tree_digest(&mirror),
                mirrordom_sync::tree_digest(&live),
                "vector {:?}",
                vector.name
            );
        }
    }
}
