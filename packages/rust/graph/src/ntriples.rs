//! N-Triples deserialization.
//!
//! Payloads are RDF 1.1 N-Triples (<https://www.w3.org/TR/n-triples/>),
//! parsed with [`oxttl::NTriplesParser`]. The first syntax error aborts the
//! whole payload.

use oxttl::{NTriplesParser, TurtleParseError};

use catalogwriter_shared::{CatalogWriterError, Result};

use crate::Graph;

/// Parse an N-Triples payload into a [`Graph`].
///
/// Fails with [`CatalogWriterError::Deserialization`] on the first malformed
/// statement or if the bytes are not UTF-8.
pub fn deserialize(bytes: &[u8]) -> Result<Graph> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        let line = bytes[..e.valid_up_to()]
            .iter()
            .filter(|&&b| b == b'\n')
            .count()
            + 1;
        CatalogWriterError::Deserialization {
            line,
            message: format!("invalid UTF-8: {e}"),
        }
    })?;

    let mut graph = Graph::new();
    for triple in NTriplesParser::new().for_reader(text.as_bytes()) {
        graph.insert(triple.map_err(parse_error)?);
    }

    tracing::trace!(triples = graph.len(), "deserialized graph");
    Ok(graph)
}

/// Carry the 1-based line of a syntax error over into our error type.
fn parse_error(e: TurtleParseError) -> CatalogWriterError {
    let line = match &e {
        TurtleParseError::Syntax(syntax) => usize::try_from(syntax.location().start.line)
            .map_or(usize::MAX, |line| line.saturating_add(1)),
        TurtleParseError::Io(_) => 0,
    };
    CatalogWriterError::Deserialization {
        line,
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{BlankNodeRef, NamedNodeRef, SubjectRef, TermRef};

    use crate::{Term, vocab};

    fn parse(src: &str) -> Result<Graph> {
        deserialize(src.as_bytes())
    }

    fn line_of(err: CatalogWriterError) -> usize {
        match err {
            CatalogWriterError::Deserialization { line, .. } => line,
            other => panic!("expected deserialization error, got {other:?}"),
        }
    }

    #[test]
    fn parses_basic_statements() {
        let g = parse(
            r#"# a comment
<http://example.org/d> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/ns/dcat#Dataset> .

<http://example.org/d> <http://purl.org/dc/terms/title> "Trees"@en .
_:m1 <http://www.w3.org/ns/dqv#value> "0.9"^^<http://www.w3.org/2001/XMLSchema#double> . # trailing
"#,
        )
        .expect("parse");

        assert_eq!(g.len(), 3);
        let d = NamedNodeRef::new_unchecked("http://example.org/d");
        assert_eq!(g.instances_of(vocab::dcat::DATASET).len(), 1);
        assert_eq!(g.instances_of(vocab::dcat::DATASET)[0].as_ref(), SubjectRef::from(d));
        assert_eq!(g.first_literal(d.into(), vocab::dct::TITLE), Some("Trees"));

        let m1 = g.iter().nth(2).map(|t| t.subject.as_ref()).expect("third triple");
        let Some(Term::Literal(value)) = g.objects_of(m1, vocab::dqv::HAS_VALUE).next() else {
            panic!("expected a literal value");
        };
        assert_eq!(value.value(), "0.9");
        assert_eq!(value.datatype(), oxrdf::vocab::xsd::DOUBLE);
    }

    #[test]
    fn decodes_escapes() {
        let g = parse(
            "<http://ex/s> <http://ex/p> \"say \\\"hi\\\"\\n\\u00E9\\U0001F600\\\\\" .\n\
             <http://ex/caf\\u00E9> <http://ex/p> <http://ex/o> .",
        )
        .expect("parse");
        let s = NamedNodeRef::new_unchecked("http://ex/s");
        assert_eq!(g.first_literal(s.into(), "http://ex/p"), Some("say \"hi\"\né😀\\"));
        let cafe = SubjectRef::from(NamedNodeRef::new_unchecked("http://ex/café"));
        assert!(g.iter().any(|t| t.subject.as_ref() == cafe));
    }

    #[test]
    fn blank_label_before_dot() {
        let g = parse("_:a.b <http://ex/p> _:c.").expect("parse");
        let t = g.iter().next().unwrap();
        assert_eq!(t.subject.as_ref(), SubjectRef::from(BlankNodeRef::new_unchecked("a.b")));
        assert_eq!(t.object.as_ref(), TermRef::from(BlankNodeRef::new_unchecked("c")));
    }

    #[test]
    fn empty_payload_is_empty_graph() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("\n# only comments\n\n").unwrap().is_empty());
    }

    #[test]
    fn accepts_any_end_of_line() {
        let statements = [
            "<http://ex/s> <http://ex/p> \"a\" .",
            "<http://ex/s> <http://ex/p> \"b\" .",
            "<http://ex/s> <http://ex/p> \"c\" .",
        ];
        for eol in ["\r", "\r\n", "\n"] {
            let g = parse(&statements.join(eol)).expect("parse");
            assert_eq!(g.len(), 3, "end of line {eol:?}");
        }
    }

    #[test]
    fn rejects_invalid_blank_labels() {
        for src in [
            "_:-bad <http://ex/p> \"a\" .",
            "_:.bad <http://ex/p> \"a\" .",
            "<http://ex/s> <http://ex/p> _:-bad .",
        ] {
            let err = parse(src).unwrap_err();
            assert!(
                matches!(err, CatalogWriterError::Deserialization { .. }),
                "{src} gave {err:?}"
            );
        }
    }

    #[test]
    fn rejects_relative_iris() {
        for src in [
            "<rel> <http://ex/p> \"a\" .",
            "<http://ex/s> <p> \"a\" .",
            "<http://ex/s> <http://ex/p> <../o> .",
        ] {
            let err = parse(src).unwrap_err();
            assert!(
                matches!(err, CatalogWriterError::Deserialization { .. }),
                "{src} gave {err:?}"
            );
        }
    }

    #[test]
    fn reports_line_of_error() {
        let err = parse(
            "<http://ex/s> <http://ex/p> \"ok\" .\n\
             _:-bad <http://ex/p> \"a\" .\n\
             <http://ex/s> <http://ex/p> \"ok\" .",
        )
        .unwrap_err();
        assert_eq!(line_of(err), 2);

        assert!(parse("\"literal\" <http://ex/p> <http://ex/o> .").is_err());
        assert!(parse("<http://ex/s> _:p <http://ex/o> .").is_err());
        assert!(parse("<http://ex/s> <http://ex/p> <http://ex/o> . extra").is_err());
        assert!(parse("<http://ex/a b> <http://ex/p> <http://ex/o> .").is_err());
    }

    #[test]
    fn rejects_non_utf8() {
        let bytes = b"<http://ex/s> <http://ex/p> \"ok\" .\n<http://ex/s> <http://ex/p> \"\xff\" .";
        let err = deserialize(bytes).unwrap_err();
        assert_eq!(line_of(err), 2);
    }

    #[test]
    fn rejects_json_payload() {
        let err = parse(r#"{"title": "not a graph"}"#).unwrap_err();
        assert!(matches!(err, CatalogWriterError::Deserialization { line: 1, .. }));
    }
}
