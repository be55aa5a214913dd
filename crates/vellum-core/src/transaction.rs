use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::EngineError;
use crate::node::{add_to_mark_set, remove_from_mark_set, AttrPatch, Mark, Node};
use crate::position::{locate, resolve, text_runs_in, Location};
use crate::schema::Schema;
use crate::selection::Selection;
use crate::state::EditorState;
use crate::step::{apply_step, Step, StepMap};

/// An ordered, atomically-applied set of document and selection edits.
///
/// A transaction is a builder seeded from an `EditorState`: each builder
/// operation validates eagerly against a working copy of the document
/// and appends the corresponding steps. Applying the transaction back to
/// a state replays the steps from scratch, so a transaction modified by
/// plugin hooks is still checked as a whole.
#[derive(Debug, Clone)]
pub struct Transaction {
    schema: Arc<Schema>,
    doc: Arc<Node>,
    steps: Vec<Step>,
    selection_after: Option<Selection>,
    meta: HashMap<String, Value>,
}

impl Transaction {
    pub(crate) fn begin(state: &EditorState) -> Self {
        Self {
            schema: state.schema_arc().clone(),
            doc: state.doc().clone(),
            steps: Vec::new(),
            selection_after: None,
            meta: HashMap::new(),
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The document as it stands after the steps recorded so far.
    pub fn doc_after(&self) -> &Arc<Node> {
        &self.doc
    }

    pub fn selection_after(&self) -> Option<Selection> {
        self.selection_after
    }

    pub fn meta(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    pub fn set_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Records the selection the new state should adopt. When never set,
    /// applying maps the prior selection through the steps instead.
    pub fn set_selection(mut self, selection: Selection) -> Self {
        self.selection_after = Some(selection);
        self
    }

    /// Appends an explicit step, validating it against the working
    /// document.
    pub fn step(mut self, step: Step) -> Result<Self, EngineError> {
        let result = apply_step(&self.schema, &self.doc, &step)?;
        self.doc = result.doc;
        self.steps.push(step);
        Ok(self)
    }

    /// Inserts text at `pos`. Inherits the surrounding run's marks when
    /// the position falls inside one; `marks` applies at boundaries.
    pub fn insert_text(
        self,
        pos: usize,
        text: impl Into<String>,
        marks: Vec<Mark>,
    ) -> Result<Self, EngineError> {
        let text = text.into();
        if text.is_empty() {
            return Ok(self);
        }
        self.step(Step::InsertText { pos, text, marks })
    }

    pub fn insert_node(self, pos: usize, node: Arc<Node>) -> Result<Self, EngineError> {
        self.step(Step::InsertNode { pos, node })
    }

    pub fn remove_node(self, pos: usize) -> Result<Self, EngineError> {
        self.step(Step::RemoveNode { pos })
    }

    /// Swaps the child starting at `pos` for another node.
    pub fn replace_node(self, pos: usize, node: Arc<Node>) -> Result<Self, EngineError> {
        self.step(Step::RemoveNode { pos })?
            .step(Step::InsertNode { pos, node })
    }

    pub fn set_node_attrs(self, pos: usize, patch: AttrPatch) -> Result<Self, EngineError> {
        self.step(Step::SetNodeAttrs { pos, patch })
    }

    /// Deletes the content in `[from, to)`. The range must start and end
    /// under the same parent; it may trim text runs at either edge and
    /// removes whole children in between. Ranges that cut partway into an
    /// element are rejected.
    pub fn delete_range(mut self, from: usize, to: usize) -> Result<Self, EngineError> {
        if from >= to {
            return Ok(self);
        }
        let r_from = resolve(&self.doc, from)?;
        let r_to = resolve(&self.doc, to)?;
        if r_from.parent_path() != r_to.parent_path() {
            return Err(EngineError::TransactionRejected(
                "deletion range crosses node boundaries".to_string(),
            ));
        }
        let parent = r_from
            .parent
            .as_element()
            .ok_or_else(|| {
                EngineError::TransactionRejected("deletion parent is not an element".to_string())
            })?
            .clone();

        let loc_from = locate(&parent, r_from.offset);
        let loc_to = locate(&parent, r_to.offset);

        // Same-run fast path.
        if let (
            Location::InText {
                index: ia,
                char_offset: ca,
                ..
            },
            Location::InText {
                index: ib,
                char_offset: cb,
                ..
            },
        ) = (&loc_from, &loc_to)
        {
            if ia == ib && cb > ca {
                return self.step(Step::RemoveText {
                    pos: from,
                    len: cb - ca,
                });
            }
        }

        let content_start = r_from.content_start;

        // Edits proceed right to left so earlier positions stay valid in
        // the working document.
        let (tail_trim, end_index) = match loc_to {
            Location::InText {
                index,
                run_start,
                char_offset,
            } => {
                if char_offset > 0 {
                    (Some((content_start + run_start, char_offset)), index)
                } else {
                    (None, index)
                }
            }
            Location::Boundary { index } => (None, index),
            Location::InElement => {
                return Err(EngineError::TransactionRejected(
                    "deletion range ends inside a child node".to_string(),
                ));
            }
        };

        let (head_trim, start_index) = match loc_from {
            Location::InText {
                index, char_offset, ..
            } => {
                if char_offset > 0 {
                    let run_len = parent.children[index]
                        .as_text()
                        .map(|t| t.text.chars().count())
                        .unwrap_or(0);
                    (Some((from, run_len - char_offset)), index + 1)
                } else {
                    (None, index)
                }
            }
            Location::Boundary { index } => (None, index),
            Location::InElement => {
                return Err(EngineError::TransactionRejected(
                    "deletion range starts inside a child node".to_string(),
                ));
            }
        };

        if let Some((pos, len)) = tail_trim {
            self = self.step(Step::RemoveText { pos, len })?;
        }

        // Whole children covered by the range, removed right to left.
        let mut starts = Vec::new();
        let mut acc = 0usize;
        for (index, child) in parent.children.iter().enumerate() {
            if index >= start_index && index < end_index {
                starts.push(content_start + acc);
            }
            acc += child.node_size();
        }
        for pos in starts.into_iter().rev() {
            self = self.step(Step::RemoveNode { pos })?;
        }

        if let Some((pos, len)) = head_trim {
            self = self.step(Step::RemoveText { pos, len })?;
        }

        Ok(self)
    }

    /// Applies `mark` to the inline content in `[from, to)`, splitting
    /// text runs at the range edges where necessary.
    pub fn add_mark(self, from: usize, to: usize, mark: Mark) -> Result<Self, EngineError> {
        self.remark(from, to, &|marks| add_to_mark_set(marks, &mark))
    }

    /// Removes marks of `kind` from the inline content in `[from, to)`.
    pub fn remove_mark(self, from: usize, to: usize, kind: &str) -> Result<Self, EngineError> {
        self.remark(from, to, &|marks| remove_from_mark_set(marks, kind))
    }

    fn remark(
        mut self,
        from: usize,
        to: usize,
        rewrite: &dyn Fn(&[Mark]) -> Vec<Mark>,
    ) -> Result<Self, EngineError> {
        if from >= to {
            return Ok(self);
        }
        let max = self.doc.node_size();
        if to > max {
            return Err(EngineError::OutOfRange { pos: to, max });
        }

        // Right to left, so earlier run positions survive the splits.
        let runs = text_runs_in(&self.doc, from, to);
        for run in runs.into_iter().rev() {
            let run_end = run.start + run.len;
            let cov_start = run.start.max(from);
            let cov_end = run_end.min(to);
            let new_marks = rewrite(&run.marks);
            if crate::node::mark_sets_equal(&new_marks, &run.marks) {
                continue;
            }

            if cov_start == run.start && cov_end == run_end {
                self = self.step(Step::SetTextMarks {
                    pos: run.start,
                    marks: new_marks,
                })?;
                continue;
            }

            // Partial coverage: cut everything from the covered start to
            // the run's end, then rebuild it as a rewritten segment plus
            // the untouched tail.
            let segment: String =
                self.run_text_at(run.start, cov_start - run.start, cov_end - cov_start)?;
            let tail: String =
                self.run_text_at(run.start, cov_end - run.start, run_end - cov_end)?;
            self = self.step(Step::RemoveText {
                pos: cov_start,
                len: run_end - cov_start,
            })?;
            self = self.step(Step::InsertNode {
                pos: cov_start,
                node: Arc::new(Node::Text(crate::node::TextNode {
                    text: segment,
                    marks: new_marks,
                })),
            })?;
            if !tail.is_empty() {
                self = self.step(Step::InsertNode {
                    pos: cov_end,
                    node: Arc::new(Node::Text(crate::node::TextNode {
                        text: tail,
                        marks: run.marks.clone(),
                    })),
                })?;
            }
        }
        Ok(self)
    }

    /// Reads `len` characters at `char_offset` of the run starting at
    /// `run_start` in the working document.
    fn run_text_at(
        &self,
        run_start: usize,
        char_offset: usize,
        len: usize,
    ) -> Result<String, EngineError> {
        let r = resolve(&self.doc, run_start)?;
        let parent = r.parent.as_element().ok_or_else(|| {
            EngineError::TransactionRejected("run parent is not an element".to_string())
        })?;
        match locate(parent, r.offset) {
            Location::InText { index, .. } => {
                let text = parent.children[index]
                    .as_text()
                    .map(|t| t.text.clone())
                    .unwrap_or_default();
                Ok(text
                    .chars()
                    .skip(char_offset)
                    .take(len)
                    .collect())
            }
            _ => Err(EngineError::TransactionRejected(
                "no text run at the expected position".to_string(),
            )),
        }
    }

    /// Replays the steps against `doc_before`, returning the inverse
    /// steps in the order that undoes the transaction.
    pub fn inverted(&self, doc_before: &Arc<Node>) -> Result<Vec<Step>, EngineError> {
        let mut doc = doc_before.clone();
        let mut inverses = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let result = apply_step(&self.schema, &doc, step)?;
            doc = result.doc;
            inverses.push(result.inverse);
        }
        inverses.reverse();
        Ok(inverses)
    }

    /// Replays the steps against `doc_before`, returning the resulting
    /// document and the step maps for selection projection.
    pub(crate) fn replay(
        &self,
        doc_before: &Arc<Node>,
    ) -> Result<(Arc<Node>, Vec<StepMap>), EngineError> {
        let mut doc = doc_before.clone();
        let mut maps = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let result = apply_step(&self.schema, &doc, step).map_err(|err| {
                EngineError::TransactionRejected(err.to_string())
            })?;
            doc = result.doc;
            maps.push(result.map);
        }
        Ok((doc, maps))
    }

    /// The schema the transaction was seeded with.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}
