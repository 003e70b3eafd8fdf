use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::FunctionDecl;
use crate::environment::Environment;
use crate::error::LoxError;
use crate::token::{Literal, format_number};

/// Name of the method that runs when a class is called.
pub const INITIALIZER_NAME: &str = "init";

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    Function(Rc<Function>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
}

impl Value {
    /// Only `nil` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Class(_) => "class",
            Value::Instance(_) => "instance",
        }
    }
}

#[derive(Debug)]
pub enum Function {
    User(LoxFunction),
    Native(NativeFunction),
}

impl Function {
    pub fn arity(&self) -> usize {
        match self {
            Function::User(f) => f.arity(),
            Function::Native(f) => f.arity,
        }
    }
}

pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub func: fn(&[Value]) -> Result<Value, LoxError>,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// A user function together with the frame it closes over.
#[derive(Clone)]
pub struct LoxFunction {
    pub declaration: Rc<FunctionDecl>,
    /// `None` for functions declared at the top level, which only see globals.
    pub closure: Option<Rc<RefCell<Environment>>>,
    pub is_initializer: bool,
}

impl LoxFunction {
    pub fn new(
        declaration: Rc<FunctionDecl>,
        closure: Option<Rc<RefCell<Environment>>>,
        is_initializer: bool,
    ) -> Self {
        Self {
            declaration,
            closure,
            is_initializer,
        }
    }

    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }

    pub fn name(&self) -> &str {
        &self.declaration.name.lexeme
    }

    /// Re-closes the function over a frame whose only slot holds `instance`,
    /// which is where the resolver placed `this`.
    pub fn bind(&self, instance: Rc<Instance>) -> LoxFunction {
        let mut env = Environment::new(self.closure.clone());
        env.define(0, Value::Instance(instance));
        LoxFunction {
            declaration: Rc::clone(&self.declaration),
            closure: Some(Rc::new(RefCell::new(env))),
            is_initializer: self.is_initializer,
        }
    }
}

// Closures can reach themselves through their frame, so Debug stays shallow.
impl fmt::Debug for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoxFunction")
            .field("name", &self.name())
            .field("arity", &self.arity())
            .field("is_initializer", &self.is_initializer)
            .finish()
    }
}

#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub superclass: Option<Rc<Class>>,
    pub methods: HashMap<String, LoxFunction>,
    pub getters: HashMap<String, LoxFunction>,
    pub static_methods: HashMap<String, Rc<Function>>,
}

impl Class {
    /// Finds a regular method on this class or the nearest ancestor defining it.
    pub fn find_method(&self, name: &str) -> Option<&LoxFunction> {
        self.methods
            .get(name)
            .or_else(|| self.superclass.as_ref()?.find_method(name))
    }

    pub fn find_getter(&self, name: &str) -> Option<&LoxFunction> {
        self.getters
            .get(name)
            .or_else(|| self.superclass.as_ref()?.find_getter(name))
    }

    pub fn find_static_method(&self, name: &str) -> Option<Rc<Function>> {
        if let Some(method) = self.static_methods.get(name) {
            return Some(Rc::clone(method));
        }
        self.superclass.as_ref()?.find_static_method(name)
    }

    /// Calling the class takes as many arguments as its initializer.
    pub fn arity(&self) -> usize {
        self.find_method(INITIALIZER_NAME)
            .map_or(0, LoxFunction::arity)
    }
}

pub struct Instance {
    pub class: Rc<Class>,
    fields: RefCell<HashMap<String, Value>>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: RefCell::new(HashMap::new()),
        }
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    /// Creates the field on first assignment.
    pub fn set(&self, name: &str, value: Value) {
        self.fields.borrow_mut().insert(name.to_string(), value);
    }
}

// Fields may point back at the instance, so only their names are shown.
impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.fields.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("Instance")
            .field("class", &self.class.name)
            .field("fields", &names)
            .finish()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Function(func) => write!(f, "{}", func),
            Value::Class(class) => write!(f, "<class {}>", class.name),
            Value::Instance(instance) => write!(f, "<{} instance>", instance.class.name),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::User(func) => write!(f, "<fn {}>", func.name()),
            Function::Native(func) => write!(f, "<native fn {}>", func.name),
        }
    }
}

impl From<Literal> for Value {
    fn from(lit: Literal) -> Self {
        match lit {
            Literal::Number(n) => Value::Number(n),
            Literal::String(s) => Value::String(s),
            Literal::Bool(b) => Value::Bool(b),
            Literal::Nil => Value::Nil,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Stmt;
    use crate::token::{Token, TokenType};

    fn declaration(name: &str, params: &[&str]) -> Rc<FunctionDecl> {
        let token = |lexeme: &str| Token::synthetic(TokenType::Identifier, lexeme, 1);
        Rc::new(FunctionDecl {
            name: token(name),
            params: params.iter().map(|p| token(p)).collect(),
            body: Vec::<Stmt>::new(),
            is_static: false,
            is_getter: false,
        })
    }

    fn function(name: &str, params: &[&str]) -> LoxFunction {
        LoxFunction::new(declaration(name, params), None, false)
    }

    fn class(
        name: &str,
        superclass: Option<Rc<Class>>,
        methods: Vec<LoxFunction>,
    ) -> Rc<Class> {
        Rc::new(Class {
            name: name.to_string(),
            superclass,
            methods: methods
                .into_iter()
                .map(|m| (m.name().to_string(), m))
                .collect(),
            getters: HashMap::new(),
            static_methods: HashMap::new(),
        })
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Number(0.0).is_truthy());
        assert!(Value::String(String::new()).is_truthy());
    }

    #[test]
    fn scalar_display() {
        assert_eq!(Value::Nil.to_string(), "nil");
        assert_eq!(Value::Bool(false).to_string(), "false");
        assert_eq!(Value::Number(3.0).to_string(), "3");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert_eq!(Value::String("raw text".to_string()).to_string(), "raw text");
    }

    #[test]
    fn callable_display() {
        let user = Value::Function(Rc::new(Function::User(function("greet", &[]))));
        assert_eq!(user.to_string(), "<fn greet>");

        let native = Value::Function(Rc::new(Function::Native(NativeFunction {
            name: "clock",
            arity: 0,
            func: |_| Ok(Value::Number(0.0)),
        })));
        assert_eq!(native.to_string(), "<native fn clock>");
    }

    #[test]
    fn class_and_instance_display() {
        let point = class("Point", None, vec![]);
        assert_eq!(Value::Class(Rc::clone(&point)).to_string(), "<class Point>");
        let instance = Value::Instance(Rc::new(Instance::new(point)));
        assert_eq!(instance.to_string(), "<Point instance>");
    }

    #[test]
    fn scalars_compare_by_value() {
        assert_eq!(Value::Number(1.0), Value::Number(1.0));
        assert_eq!(Value::String("a".into()), Value::String("a".into()));
        assert_eq!(Value::Nil, Value::Nil);
        assert_ne!(Value::Nil, Value::Bool(false));
        assert_ne!(Value::Number(0.0), Value::String("0".into()));
    }

    #[test]
    fn objects_compare_by_identity() {
        let point = class("Point", None, vec![]);
        let a = Rc::new(Instance::new(Rc::clone(&point)));
        let b = Rc::new(Instance::new(Rc::clone(&point)));
        assert_eq!(Value::Instance(Rc::clone(&a)), Value::Instance(Rc::clone(&a)));
        assert_ne!(Value::Instance(a), Value::Instance(b));

        let f = Rc::new(Function::User(function("f", &[])));
        let g = Rc::new(Function::User(function("f", &[])));
        assert_eq!(Value::Function(Rc::clone(&f)), Value::Function(Rc::clone(&f)));
        assert_ne!(Value::Function(f), Value::Function(g));
    }

    #[test]
    fn literal_converts_to_value() {
        let value: Value = Literal::Number(42.0).into();
        assert_eq!(value, Value::Number(42.0));
        let value: Value = Literal::Nil.into();
        assert_eq!(value, Value::Nil);
    }

    #[test]
    fn find_method_walks_superclass_chain() {
        let base = class("Base", None, vec![function("greet", &[]), function("name", &[])]);
        let derived = class("Derived", Some(Rc::clone(&base)), vec![function("name", &["x"])]);

        assert_eq!(derived.find_method("greet").map(|m| m.arity()), Some(0));
        assert_eq!(derived.find_method("name").map(|m| m.arity()), Some(1));
        assert!(derived.find_method("missing").is_none());
    }

    #[test]
    fn class_arity_follows_initializer() {
        let plain = class("Plain", None, vec![]);
        assert_eq!(plain.arity(), 0);
        let base = class("Base", None, vec![function("init", &["a", "b"])]);
        let derived = class("Derived", Some(base), vec![]);
        assert_eq!(derived.arity(), 2);
    }

    #[test]
    fn bind_puts_instance_in_slot_zero() {
        let point = class("Point", None, vec![]);
        let instance = Rc::new(Instance::new(point));
        let bound = function("m", &[]).bind(Rc::clone(&instance));

        let frame = bound.closure.as_ref().expect("bound methods have a frame");
        match Environment::get_at(frame, 0, 0) {
            Value::Instance(this) => assert!(Rc::ptr_eq(&this, &instance)),
            other => panic!("expected instance, got {:?}", other),
        }
    }

    #[test]
    fn instance_fields_are_created_on_assignment() {
        let instance = Instance::new(class("Bag", None, vec![]));
        assert_eq!(instance.field("x"), None);
        instance.set("x", Value::Number(1.0));
        instance.set("x", Value::Number(2.0));
        assert_eq!(instance.field("x"), Some(Value::Number(2.0)));
    }
}
