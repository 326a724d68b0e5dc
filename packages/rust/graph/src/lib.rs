//! In-memory RDF graph index and N-Triples deserializer.
//!
//! This crate provides:
//! - [`Graph`]: an insertion-ordered set of `oxrdf` [`Triple`]s with the two
//!   lookups the writer needs (subjects by property/value, objects by
//!   subject/property)
//! - [`deserialize`]: N-Triples payload bytes → [`Graph`], via `oxttl`
//! - [`vocab`]: the DCAT, DCTERMS and DQV terms used downstream

pub mod ntriples;
pub mod vocab;

use std::collections::{HashMap, HashSet};

pub use ntriples::deserialize;
pub use oxrdf::{
    BlankNode, Literal, NamedNode, NamedNodeRef, Subject, SubjectRef, Term, TermRef, Triple,
};

/// An insertion-ordered set of triples.
///
/// Lookups return results in the order statements were first inserted, so
/// "first match" is stable for a given payload.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    triples: Vec<Triple>,
    seen: HashSet<Triple>,
    by_predicate: HashMap<String, Vec<usize>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a triple. Returns `false` if it was already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        if self.seen.contains(&triple) {
            return false;
        }
        let idx = self.triples.len();
        self.by_predicate
            .entry(triple.predicate.as_str().to_owned())
            .or_default()
            .push(idx);
        self.seen.insert(triple.clone());
        self.triples.push(triple);
        true
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    fn with_predicate<'a>(
        &'a self,
        predicate: &str,
    ) -> impl Iterator<Item = &'a Triple> + use<'a> {
        self.by_predicate
            .get(predicate)
            .into_iter()
            .flatten()
            .map(move |&i| &self.triples[i])
    }

    /// All distinct subjects having `predicate` with value `object`.
    pub fn subjects_with(&self, predicate: &str, object: TermRef<'_>) -> Vec<&Subject> {
        let mut out: Vec<&Subject> = Vec::new();
        for t in self.with_predicate(predicate) {
            if t.object.as_ref() == object && !out.contains(&&t.subject) {
                out.push(&t.subject);
            }
        }
        out
    }

    /// All objects of `predicate` for `subject`.
    pub fn objects_of<'a>(
        &'a self,
        subject: SubjectRef<'a>,
        predicate: &str,
    ) -> impl Iterator<Item = &'a Term> + use<'a> {
        self.with_predicate(predicate)
            .filter(move |t| t.subject.as_ref() == subject)
            .map(|t| &t.object)
    }

    /// All distinct subjects typed `rdf:type <class_iri>`.
    pub fn instances_of(&self, class_iri: &str) -> Vec<&Subject> {
        self.subjects_with(
            oxrdf::vocab::rdf::TYPE.as_str(),
            NamedNodeRef::new_unchecked(class_iri).into(),
        )
    }

    /// Lexical form of the first literal object of `predicate` for `subject`.
    pub fn first_literal<'a>(&'a self, subject: SubjectRef<'a>, predicate: &str) -> Option<&'a str> {
        self.objects_of(subject, predicate).find_map(|term| match term {
            Term::Literal(literal) => Some(literal.value()),
            _ => None,
        })
    }
}

/// The node an object term names, for following it as a subject.
///
/// Literals are never subjects.
pub fn as_subject(term: &Term) -> Option<SubjectRef<'_>> {
    match term {
        Term::NamedNode(node) => Some(node.as_ref().into()),
        Term::BlankNode(node) => Some(node.as_ref().into()),
        _ => None,
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        let mut graph = Graph::new();
        for triple in iter {
            graph.insert(triple);
        }
        graph
    }
}
