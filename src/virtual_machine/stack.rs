//! LIFO data stack used by the VM.

use thiserror::Error;

/// Returned when a stack operation needs more values than are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stack underflow: {required} values required, {available} available")]
pub struct StackUnderflow {
    pub required: usize,
    pub available: usize,
}

/// Growable last-in first-out container.
///
/// The container itself has no capacity ceiling; depth limits are a VM policy
/// (see [`VmConfig`](super::vm::VmConfig)). Contents are exposed bottom-to-top.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Stack<T> {
    items: Vec<T>,
}

impl<T> Stack<T> {
    /// Creates an empty stack.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Pushes `value` onto the top of the stack.
    pub fn push(&mut self, value: T) {
        self.items.push(value);
    }

    /// Removes and returns the top value.
    pub fn pop(&mut self) -> Result<T, StackUnderflow> {
        self.items.pop().ok_or(StackUnderflow {
            required: 1,
            available: 0,
        })
    }

    /// Pops `N` values, top first.
    ///
    /// Either all `N` values are removed or the stack is left untouched.
    pub fn pop_n<const N: usize>(&mut self) -> Result<[T; N], StackUnderflow> {
        let available = self.items.len();
        if available < N {
            return Err(StackUnderflow {
                required: N,
                available,
            });
        }
        let mut popped = self.items.split_off(available - N);
        popped.reverse();
        popped.try_into().map_err(|_| StackUnderflow {
            required: N,
            available,
        })
    }

    /// Returns the value `depth` slots below the top (`0` is the top).
    pub fn peek(&self, depth: usize) -> Result<&T, StackUnderflow> {
        let available = self.items.len();
        available
            .checked_sub(depth + 1)
            .and_then(|idx| self.items.get(idx))
            .ok_or(StackUnderflow {
                required: depth + 1,
                available,
            })
    }

    /// Exchanges the top value with the value `depth` slots below it.
    pub fn swap(&mut self, depth: usize) -> Result<(), StackUnderflow> {
        let available = self.items.len();
        let Some(below) = available.checked_sub(depth + 1) else {
            return Err(StackUnderflow {
                required: depth + 1,
                available,
            });
        };
        self.items.swap(below, available - 1);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the contents bottom-to-top.
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T> From<Vec<T>> for Stack<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

impl<T> FromIterator<T> for Stack<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

impl<T: PartialEq> PartialEq<Vec<T>> for Stack<T> {
    fn eq(&self, other: &Vec<T>) -> bool {
        &self.items == other
    }
}

impl<T: PartialEq> PartialEq<[T]> for Stack<T> {
    fn eq(&self, other: &[T]) -> bool {
        self.items.as_slice() == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let mut stack = Stack::new();
        stack.push(1);
        stack.push(2);
        assert_eq!(stack.pop(), Ok(2));
        assert_eq!(stack.pop(), Ok(1));
    }

    #[test]
    fn pop_empty_underflows() {
        let mut stack: Stack<u8> = Stack::new();
        assert_eq!(
            stack.pop(),
            Err(StackUnderflow {
                required: 1,
                available: 0,
            })
        );
    }

    #[test]
    fn pop_n_returns_top_first() {
        let mut stack = Stack::from(vec![1, 2, 3]);
        assert_eq!(stack.pop_n::<2>(), Ok([3, 2]));
        assert_eq!(stack, vec![1]);
    }

    #[test]
    fn pop_n_underflow_leaves_stack_untouched() {
        let mut stack = Stack::from(vec![7]);
        let err = stack.pop_n::<2>().unwrap_err();
        assert_eq!(err.required, 2);
        assert_eq!(err.available, 1);
        assert_eq!(stack, vec![7]);
    }

    #[test]
    fn peek_and_swap() {
        let mut stack = Stack::from(vec![1, 2, 3]);
        assert_eq!(stack.peek(0), Ok(&3));
        assert_eq!(stack.peek(2), Ok(&1));
        assert!(stack.peek(3).is_err());

        stack.swap(2).unwrap();
        assert_eq!(stack, vec![3, 2, 1]);
        assert_eq!(
            stack.swap(3),
            Err(StackUnderflow {
                required: 4,
                available: 3,
            })
        );
    }

    #[test]
    fn clone_is_independent() {
        let original = Stack::from(vec![1, 2]);
        let mut copy = original.clone();
        copy.push(3);
        assert_eq!(original, vec![1, 2]);
        assert_eq!(copy.as_slice(), &[1, 2, 3]);
    }
}
