//! Linear undo/redo history.

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStack<T> {
    done:   Vec<T>,
    undone: Vec<T>,
}

impl<T> Default for HistoryStack<T> {
    fn default() -> Self {
        Self { done: Vec::new(), undone: Vec::new() }
    }
}

impl<T> HistoryStack<T> {
    pub fn new() -> Self { Self::default() }

    /// Records new work and drops the redo history.
    pub fn push(&mut self, item: T) {
        self.undone.clear();
        self.done.push(item);
    }

    /// Moves the top of `done` to `undone` and returns a reference to it.
    pub fn undo(&mut self) -> Option<&T> {
        let item = self.done.pop()?;
        self.undone.push(item);
        self.undone.last()
    }

    /// Moves the top of `undone` back to `done`.
    pub fn redo(&mut self) -> Option<&T> {
        let item = self.undone.pop()?;
        self.done.push(item);
        self.done.last()
    }

    /// Undoes the most recent `done` item matching `pred`, wherever it sits.
    pub fn undo_where(&mut self, pred: impl Fn(&T) -> bool) -> Option<&T> {
        let idx = self.done.iter().rposition(|t| pred(t))?;
        let item = self.done.remove(idx);
        self.undone.push(item);
        self.undone.last()
    }

    /// Redoes the most recently undone item matching `pred`.
    pub fn redo_where(&mut self, pred: impl Fn(&T) -> bool) -> Option<&T> {
        let idx = self.undone.iter().rposition(|t| pred(t))?;
        let item = self.undone.remove(idx);
        self.done.push(item);
        self.done.last()
    }

    /// Drops every item matching `pred` from both stacks. Returns how many went.
    pub fn remove_where(&mut self, pred: impl Fn(&T) -> bool) -> usize {
        let before = self.done.len() + self.undone.len();
        self.done.retain(|t| !pred(t));
        self.undone.retain(|t| !pred(t));
        before - self.done.len() - self.undone.len()
    }

    pub fn clear(&mut self) {
        self.done.clear();
        self.undone.clear();
    }

    pub fn done(&self) -> &[T] { &self.done }
    pub fn undone(&self) -> &[T] { &self.undone }
    pub fn can_redo(&self) -> bool { !self.undone.is_empty() }
}
