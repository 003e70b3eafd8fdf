use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::LoxError;
use crate::token::Token;
use crate::value::Value;

/// One lexical frame of indexed slots. Slot numbers and hop distances come
/// from the resolver, so lookups never compare names.
#[derive(Debug, Default)]
pub struct Environment {
    slots: Vec<Value>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new(enclosing: Option<Rc<RefCell<Environment>>>) -> Self {
        Self {
            slots: Vec::new(),
            enclosing,
        }
    }

    /// Stores `value` in `slot`, growing the frame with nils when the
    /// declaration order skipped ahead.
    pub fn define(&mut self, slot: usize, value: Value) {
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, Value::Nil);
        }
        self.slots[slot] = value;
    }

    /// Appends a binding in the next free slot. Declarations run in the
    /// order the resolver numbered them, so this lands where the resolver
    /// said it would.
    pub fn push(&mut self, value: Value) {
        self.slots.push(value);
    }

    /// Walks `distance` frames up the chain.
    ///
    /// # Panics
    ///
    /// When the chain is shorter than `distance`, which means the resolver
    /// and the interpreter disagree about scope shape.
    pub fn ancestor(env: &Rc<RefCell<Environment>>, distance: usize) -> Rc<RefCell<Environment>> {
        let mut current = Rc::clone(env);
        for hop in 0..distance {
            let next = current.borrow().enclosing.clone();
            current = match next {
                Some(next) => next,
                None => panic!(
                    "environment chain ends after {} of {} hops",
                    hop, distance
                ),
            };
        }
        current
    }

    pub fn get_at(env: &Rc<RefCell<Environment>>, distance: usize, slot: usize) -> Value {
        Self::ancestor(env, distance).borrow().get(slot)
    }

    pub fn assign_at(env: &Rc<RefCell<Environment>>, distance: usize, slot: usize, value: Value) {
        let frame = Self::ancestor(env, distance);
        let mut frame = frame.borrow_mut();
        assert!(
            slot < frame.slots.len(),
            "assignment to undefined slot {} at distance {}",
            slot,
            distance
        );
        frame.slots[slot] = value;
    }

    fn get(&self, slot: usize) -> Value {
        match self.slots.get(slot) {
            Some(value) => value.clone(),
            None => panic!(
                "read of undefined slot {} in a frame of {}",
                slot,
                self.slots.len()
            ),
        }
    }
}

/// Top-level bindings, looked up by name. Kept apart from the indexed frames
/// so that later inputs can declare globals the resolver never saw.
#[derive(Debug, Default)]
pub struct Globals {
    values: HashMap<String, Value>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redefinition is allowed at the top level and simply replaces the value.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &Token) -> Result<Value, LoxError> {
        self.values
            .get(&name.lexeme)
            .cloned()
            .ok_or_else(|| undefined(name))
    }

    pub fn assign(&mut self, name: &Token, value: Value) -> Result<(), LoxError> {
        match self.values.get_mut(&name.lexeme) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(undefined(name)),
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.keys().cloned().collect();
        names.sort();
        names
    }
}

fn undefined(name: &Token) -> LoxError {
    LoxError::runtime(
        format!("Undefined variable '{}'.", name.lexeme),
        name.line,
        name.span.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenType;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    fn name(lexeme: &str) -> Token {
        Token {
            token_type: TokenType::Identifier,
            lexeme: lexeme.to_string(),
            literal: None,
            line: 4,
            span: 0..lexeme.len(),
        }
    }

    fn frame(enclosing: Option<Rc<RefCell<Environment>>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment::new(enclosing)))
    }

    #[test]
    fn define_and_get_slot() {
        let env = frame(None);
        env.borrow_mut().define(0, num(1.0));
        env.borrow_mut().define(1, num(2.0));
        assert_eq!(Environment::get_at(&env, 0, 0), num(1.0));
        assert_eq!(Environment::get_at(&env, 0, 1), num(2.0));
    }

    #[test]
    fn define_past_end_fills_with_nil() {
        let env = frame(None);
        env.borrow_mut().define(2, num(3.0));
        assert_eq!(Environment::get_at(&env, 0, 0), Value::Nil);
        assert_eq!(Environment::get_at(&env, 0, 1), Value::Nil);
        assert_eq!(Environment::get_at(&env, 0, 2), num(3.0));
    }

    #[test]
    fn push_fills_sequential_slots() {
        let env = frame(None);
        env.borrow_mut().push(num(1.0));
        env.borrow_mut().push(num(2.0));
        assert_eq!(Environment::get_at(&env, 0, 0), num(1.0));
        assert_eq!(Environment::get_at(&env, 0, 1), num(2.0));
    }

    #[test]
    fn get_at_walks_up_the_chain() {
        let outer = frame(None);
        outer.borrow_mut().define(0, Value::String("outer".to_string()));
        let middle = frame(Some(Rc::clone(&outer)));
        middle.borrow_mut().define(0, Value::String("middle".to_string()));
        let inner = frame(Some(Rc::clone(&middle)));

        assert_eq!(
            Environment::get_at(&inner, 2, 0),
            Value::String("outer".to_string())
        );
        assert_eq!(
            Environment::get_at(&inner, 1, 0),
            Value::String("middle".to_string())
        );
    }

    #[test]
    fn assign_at_updates_the_right_frame() {
        let outer = frame(None);
        outer.borrow_mut().define(0, num(1.0));
        let inner = frame(Some(Rc::clone(&outer)));
        inner.borrow_mut().define(0, num(10.0));

        Environment::assign_at(&inner, 1, 0, num(2.0));

        assert_eq!(Environment::get_at(&outer, 0, 0), num(2.0));
        assert_eq!(Environment::get_at(&inner, 0, 0), num(10.0));
    }

    #[test]
    fn ancestor_zero_is_self() {
        let env = frame(None);
        assert!(Rc::ptr_eq(&Environment::ancestor(&env, 0), &env));
    }

    #[test]
    fn captured_frame_outlives_its_creator() {
        let captured = {
            let env = frame(None);
            env.borrow_mut().define(0, num(7.0));
            frame(Some(env))
        };
        assert_eq!(Environment::get_at(&captured, 1, 0), num(7.0));
    }

    #[test]
    #[should_panic(expected = "environment chain ends")]
    fn ancestor_beyond_chain_panics() {
        let env = frame(None);
        Environment::ancestor(&env, 1);
    }

    #[test]
    #[should_panic(expected = "undefined slot")]
    fn reading_missing_slot_panics() {
        let env = frame(None);
        Environment::get_at(&env, 0, 3);
    }

    #[test]
    fn globals_define_get_assign() {
        let mut globals = Globals::new();
        globals.define("a", num(1.0));
        assert_eq!(globals.get(&name("a")).unwrap(), num(1.0));

        globals.assign(&name("a"), num(2.0)).unwrap();
        assert_eq!(globals.get(&name("a")).unwrap(), num(2.0));
    }

    #[test]
    fn globals_can_be_redefined() {
        let mut globals = Globals::new();
        globals.define("a", num(1.0));
        globals.define("a", Value::Bool(true));
        assert_eq!(globals.get(&name("a")).unwrap(), Value::Bool(true));
    }

    #[test]
    fn undefined_global_is_a_runtime_error() {
        let mut globals = Globals::new();
        let err = globals.get(&name("ghost")).unwrap_err();
        assert_eq!(err.message(), "Undefined variable 'ghost'.");
        assert_eq!(err.line(), Some(4));

        let err = globals.assign(&name("ghost"), num(1.0)).unwrap_err();
        assert!(matches!(err, LoxError::Runtime { .. }));
        assert!(!globals.names().contains(&"ghost".to_string()));
    }

    #[test]
    fn global_names_are_sorted() {
        let mut globals = Globals::new();
        globals.define("b", Value::Nil);
        globals.define("a", Value::Nil);
        assert_eq!(globals.names(), vec!["a".to_string(), "b".to_string()]);
    }
}
