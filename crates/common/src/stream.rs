//! Lazy, memoized, possibly infinite sequences.
//!
//! A stream is a shared cell that is either still pending (holding the
//! producer of its first node), or resolved to `Empty` or `Cons(head, tail)`.
//! Forcing runs the producer once and caches the node, so every holder of
//! the stream sees the same elements.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::runtime::Runtime;
use crate::value::{ErrorValue, Value};

type Producer = Box<dyn FnOnce(&mut dyn Runtime) -> Result<StreamNode, ErrorValue>>;

/// A resolved stream node.
#[derive(Clone)]
pub enum StreamNode {
    Empty,
    Cons(Value, Stream),
}

enum State {
    Pending(Producer),
    Forcing,
    Resolved(StreamNode),
}

#[derive(Clone)]
pub struct Stream(Rc<RefCell<State>>);

impl Stream {
    pub fn empty() -> Self {
        Self::resolved(StreamNode::Empty)
    }

    pub fn cons(head: Value, tail: Stream) -> Self {
        Self::resolved(StreamNode::Cons(head, tail))
    }

    /// A stream whose first node is computed on demand.
    pub fn lazy<F>(producer: F) -> Self
    where
        F: FnOnce(&mut dyn Runtime) -> Result<StreamNode, ErrorValue> + 'static,
    {
        Stream(Rc::new(RefCell::new(State::Pending(Box::new(producer)))))
    }

    /// A finite, fully resolved stream over `values`.
    pub fn from_values(values: Vec<Value>) -> Self {
        values
            .into_iter()
            .rev()
            .fold(Stream::empty(), |tail, head| Stream::cons(head, tail))
    }

    fn resolved(node: StreamNode) -> Self {
        Stream(Rc::new(RefCell::new(State::Resolved(node))))
    }

    /// Detach the tail of a node nothing else holds, leaving it empty.
    fn unlink(&mut self) -> Option<Stream> {
        if Rc::strong_count(&self.0) != 1 {
            return None;
        }
        let mut state = self.0.try_borrow_mut().ok()?;
        match std::mem::replace(&mut *state, State::Resolved(StreamNode::Empty)) {
            State::Resolved(StreamNode::Cons(_, tail)) => Some(tail),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &Stream) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The node if it has already been forced.
    pub fn peek(&self) -> Option<StreamNode> {
        match &*self.0.borrow() {
            State::Resolved(node) => Some(node.clone()),
            State::Pending(_) | State::Forcing => None,
        }
    }

    /// Resolve the first node, running the producer if needed.
    pub fn force(&self, runtime: &mut dyn Runtime) -> Result<StreamNode, ErrorValue> {
        let producer = {
            let mut state = self.0.borrow_mut();
            match std::mem::replace(&mut *state, State::Forcing) {
                State::Resolved(node) => {
                    *state = State::Resolved(node.clone());
                    return Ok(node);
                }
                State::Forcing => {
                    return Err(ErrorValue::new("streamForcedRecursively"));
                }
                State::Pending(producer) => producer,
            }
        };
        match producer(runtime) {
            Ok(node) => {
                *self.0.borrow_mut() = State::Resolved(node.clone());
                Ok(node)
            }
            Err(error) => {
                // The producer is gone; remember the failure.
                let failed = error.clone();
                *self.0.borrow_mut() = State::Pending(Box::new(move |_| Err(failed)));
                Err(error)
            }
        }
    }

    pub fn is_empty(&self, runtime: &mut dyn Runtime) -> Result<bool, ErrorValue> {
        Ok(matches!(self.force(runtime)?, StreamNode::Empty))
    }

    /// The current element, if any.
    pub fn value(&self, runtime: &mut dyn Runtime) -> Result<Option<Value>, ErrorValue> {
        Ok(match self.force(runtime)? {
            StreamNode::Cons(head, _) => Some(head),
            StreamNode::Empty => None,
        })
    }

    /// The stream after the current element, if any.
    pub fn next(&self, runtime: &mut dyn Runtime) -> Result<Option<Stream>, ErrorValue> {
        Ok(match self.force(runtime)? {
            StreamNode::Cons(_, tail) => Some(tail),
            StreamNode::Empty => None,
        })
    }

    /// Element at 0-based position `index`.
    pub fn nth(&self, runtime: &mut dyn Runtime, index: usize) -> Result<Option<Value>, ErrorValue> {
        let mut current = self.clone();
        for _ in 0..index {
            match current.next(runtime)? {
                Some(tail) => current = tail,
                None => return Ok(None),
            }
        }
        current.value(runtime)
    }

    /// Pull every element. Does not terminate on infinite streams.
    pub fn to_vec(&self, runtime: &mut dyn Runtime) -> Result<Vec<Value>, ErrorValue> {
        let mut values = Vec::new();
        let mut current = self.clone();
        while let StreamNode::Cons(head, tail) = current.force(runtime)? {
            values.push(head);
            current = tail;
        }
        Ok(values)
    }
}

// Freeing a forced chain node by node would recurse once per element.
impl Drop for Stream {
    fn drop(&mut self) {
        let mut tail = self.unlink();
        while let Some(mut stream) = tail {
            tail = stream.unlink();
        }
    }
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Stream(self.clone()))
    }
}

/// Force every stream reachable from `value`, so that its display shows
/// the complete contents.
pub fn force_streams(value: &Value, runtime: &mut dyn Runtime) -> Result<(), ErrorValue> {
    match value {
        Value::Array(elements) => {
            for element in elements.iter() {
                force_streams(element, runtime)?;
            }
        }
        Value::Object(entries) => {
            for element in entries.values() {
                force_streams(element, runtime)?;
            }
        }
        Value::Stream(stream) => {
            for element in stream.to_vec(runtime)? {
                force_streams(&element, runtime)?;
            }
        }
        _ => {}
    }
    Ok(())
}
