use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, trace};

use crate::ast::{Expr, ExprId, FunctionDecl, Stmt};
use crate::environment::{Environment, Globals};
use crate::error::LoxError;
use crate::resolver::Resolutions;
use crate::token::{Token, TokenType};
use crate::value::{Class, Function, INITIALIZER_NAME, Instance, LoxFunction, NativeFunction, Value};

/// How a statement finished. `Break` and `Return` travel outwards until the
/// nearest loop or call consumes them.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Break,
    Return(Value),
}

pub struct Interpreter {
    globals: Globals,
    /// Innermost frame, or `None` while running top-level code.
    environment: Option<Rc<RefCell<Environment>>>,
    locals: Resolutions,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn clock(_args: &[Value]) -> Result<Value, LoxError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    Ok(Value::Number(now.as_secs_f64()))
}

fn runtime_error(token: &Token, message: impl Into<String>) -> LoxError {
    LoxError::runtime(message, token.line, token.span.clone())
}

impl Interpreter {
    pub fn new() -> Self {
        let mut globals = Globals::new();
        globals.define(
            "clock",
            Value::Function(Rc::new(Function::Native(NativeFunction {
                name: "clock",
                arity: 0,
                func: clock,
            }))),
        );

        Self {
            globals,
            environment: None,
            locals: HashMap::new(),
        }
    }

    /// Adds the addresses computed for a newly resolved program. Earlier
    /// entries stay, so functions from previous runs keep working.
    pub fn add_resolutions(&mut self, locals: Resolutions) {
        self.locals.extend(locals);
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.globals.names()
    }

    /// Runs a resolved program. Stops at the first runtime error. Returns the
    /// value of the last top-level expression statement, if any ran.
    pub fn interpret(
        &mut self,
        statements: &[Stmt],
        output: &mut dyn Write,
    ) -> Result<Option<Value>, LoxError> {
        let mut last_value = None;

        for stmt in statements {
            if let Stmt::Expression { expression } = stmt {
                last_value = Some(self.evaluate(expression, output)?);
                continue;
            }

            match self.execute(stmt, output)? {
                Flow::Normal => {}
                Flow::Break => panic!("'break' escaped to the top level"),
                Flow::Return(_) => panic!("'return' escaped to the top level"),
            }
        }

        Ok(last_value)
    }

    fn frame(&self) -> &Rc<RefCell<Environment>> {
        match &self.environment {
            Some(env) => env,
            None => panic!("resolved local read with no active frame"),
        }
    }

    /// Binds a declaration in the current frame, or as a global at the top level.
    fn declare(&mut self, name: &Token, value: Value) {
        match &self.environment {
            Some(env) => env.borrow_mut().push(value),
            None => self.globals.define(name.lexeme.clone(), value),
        }
    }

    fn execute(&mut self, stmt: &Stmt, output: &mut dyn Write) -> Result<Flow, LoxError> {
        trace!("execute {}", stmt);

        match stmt {
            Stmt::Expression { expression } => {
                self.evaluate(expression, output)?;
            }
            Stmt::Print { expression } => {
                let value = self.evaluate(expression, output)?;
                writeln!(output, "{}", value)?;
            }
            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(expr) => self.evaluate(expr, output)?,
                    None => Value::Nil,
                };
                self.declare(name, value);
            }
            Stmt::Block { statements } => {
                let env = Environment::new(self.environment.clone());
                return self.execute_block(statements, Rc::new(RefCell::new(env)), output);
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition, output)?.is_truthy() {
                    return self.execute(then_branch, output);
                } else if let Some(else_branch) = else_branch {
                    return self.execute(else_branch, output);
                }
            }
            Stmt::While { condition, body } => {
                while self.evaluate(condition, output)?.is_truthy() {
                    match self.execute(body, output)? {
                        Flow::Normal => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }
            Stmt::Break { .. } => return Ok(Flow::Break),
            Stmt::Function(decl) => {
                let function = LoxFunction::new(Rc::clone(decl), self.environment.clone(), false);
                self.declare(&decl.name, Value::Function(Rc::new(Function::User(function))));
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr, output)?,
                    None => Value::Nil,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.execute_class(name, superclass.as_ref(), methods, output)?,
        }

        Ok(Flow::Normal)
    }

    /// Runs `statements` inside `env`, restoring the previous frame afterwards
    /// even when a statement fails.
    fn execute_block(
        &mut self,
        statements: &[Stmt],
        env: Rc<RefCell<Environment>>,
        output: &mut dyn Write,
    ) -> Result<Flow, LoxError> {
        let previous = self.environment.replace(env);

        let mut result = Ok(Flow::Normal);
        for stmt in statements {
            match self.execute(stmt, output) {
                Ok(Flow::Normal) => {}
                other => {
                    result = other;
                    break;
                }
            }
        }

        self.environment = previous;
        result
    }

    fn execute_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        members: &[Rc<FunctionDecl>],
        output: &mut dyn Write,
    ) -> Result<(), LoxError> {
        let superclass = match superclass {
            Some(expr) => match self.evaluate(expr, output)? {
                Value::Class(class) => Some(class),
                _ => {
                    let token = match expr {
                        Expr::Variable { name, .. } => name,
                        _ => name,
                    };
                    return Err(runtime_error(token, "Superclass must be a class."));
                }
            },
            None => None,
        };

        let declaring_env = self.environment.clone();

        // Instance members close over a frame holding `super`, when there is one.
        let member_env = match &superclass {
            Some(superclass) => {
                let mut env = Environment::new(declaring_env.clone());
                env.define(0, Value::Class(Rc::clone(superclass)));
                Some(Rc::new(RefCell::new(env)))
            }
            None => declaring_env.clone(),
        };

        let mut methods = HashMap::new();
        let mut getters = HashMap::new();
        let mut static_methods = HashMap::new();

        for member in members {
            let member_name = member.name.lexeme.clone();
            if member.is_static {
                let function = LoxFunction::new(Rc::clone(member), declaring_env.clone(), false);
                static_methods.insert(member_name, Rc::new(Function::User(function)));
            } else if member.is_getter {
                let function = LoxFunction::new(Rc::clone(member), member_env.clone(), false);
                getters.insert(member_name, function);
            } else {
                let is_initializer = member_name == INITIALIZER_NAME;
                let function =
                    LoxFunction::new(Rc::clone(member), member_env.clone(), is_initializer);
                methods.insert(member_name, function);
            }
        }

        debug!(
            "class {} with {} methods, {} getters, {} static methods",
            name.lexeme,
            methods.len(),
            getters.len(),
            static_methods.len()
        );

        let class = Class {
            name: name.lexeme.clone(),
            superclass,
            methods,
            getters,
            static_methods,
        };
        self.declare(name, Value::Class(Rc::new(class)));
        Ok(())
    }

    fn look_up(&self, id: ExprId, name: &Token) -> Result<Value, LoxError> {
        match self.locals.get(&id) {
            Some(&(distance, slot)) => Ok(Environment::get_at(self.frame(), distance, slot)),
            None => self.globals.get(name),
        }
    }

    pub fn evaluate(&mut self, expr: &Expr, output: &mut dyn Write) -> Result<Value, LoxError> {
        match expr {
            Expr::Literal { value } => Ok(Value::from(value.clone())),
            Expr::Grouping { expression } => self.evaluate(expression, output),
            Expr::Variable { id, name } => self.look_up(*id, name),
            Expr::This { id, keyword } => self.look_up(*id, keyword),
            Expr::Assign { id, name, value } => {
                let value = self.evaluate(value, output)?;
                match self.locals.get(id) {
                    Some(&(distance, slot)) => {
                        Environment::assign_at(self.frame(), distance, slot, value.clone())
                    }
                    None => self.globals.assign(name, value.clone())?,
                }
                Ok(value)
            }
            Expr::Unary { operator, right } => {
                let right = self.evaluate(right, output)?;
                match (operator.token_type, right) {
                    (TokenType::Minus, Value::Number(n)) => Ok(Value::Number(-n)),
                    (TokenType::Minus, other) => Err(runtime_error(
                        operator,
                        format!("Operand of '-' must be a number, got {}.", describe(&other)),
                    )),
                    (TokenType::Bang, value) => Ok(Value::Bool(!value.is_truthy())),
                    (_, _) => unreachable!("parser only builds '-' and '!' unary expressions"),
                }
            }
            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left, output)?;
                let right = self.evaluate(right, output)?;
                binary(operator, left, right)
            }
            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left, output)?;
                let short_circuits = match operator.token_type {
                    TokenType::Or => left.is_truthy(),
                    _ => !left.is_truthy(),
                };
                if short_circuits {
                    Ok(left)
                } else {
                    self.evaluate(right, output)
                }
            }
            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee, output)?;
                let mut values = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    values.push(self.evaluate(argument, output)?);
                }
                self.call_value(callee, values, paren, output)
            }
            Expr::Get { object, name } => match self.evaluate(object, output)? {
                Value::Instance(instance) => self.get_property(&instance, name, output),
                Value::Class(class) => class
                    .find_static_method(&name.lexeme)
                    .map(Value::Function)
                    .ok_or_else(|| {
                        runtime_error(name, format!("Undefined property '{}'.", name.lexeme))
                    }),
                _ => Err(runtime_error(name, "Only instances have properties.")),
            },
            Expr::Set {
                object,
                name,
                value,
            } => {
                let Value::Instance(instance) = self.evaluate(object, output)? else {
                    return Err(runtime_error(name, "Only instances have fields."));
                };
                let value = self.evaluate(value, output)?;
                instance.set(&name.lexeme, value.clone());
                Ok(value)
            }
            Expr::Super {
                id,
                keyword,
                method,
            } => self.evaluate_super(*id, keyword, method, output),
        }
    }

    fn evaluate_super(
        &mut self,
        id: ExprId,
        keyword: &Token,
        method: &Token,
        output: &mut dyn Write,
    ) -> Result<Value, LoxError> {
        let Some(&(distance, _)) = self.locals.get(&id) else {
            panic!("'super' on line {} was never resolved", keyword.line);
        };

        // `this` always sits in the frame just inside the one holding `super`.
        let superclass = Environment::get_at(self.frame(), distance, 0);
        let instance = Environment::get_at(self.frame(), distance - 1, 0);
        let (Value::Class(superclass), Value::Instance(instance)) = (superclass, instance) else {
            panic!("'super' frames on line {} hold the wrong values", keyword.line);
        };

        if let Some(getter) = superclass.find_getter(&method.lexeme) {
            let bound = getter.bind(instance);
            return self.call_function(&bound, Vec::new(), output);
        }

        match superclass.find_method(&method.lexeme) {
            Some(found) => Ok(Value::Function(Rc::new(Function::User(
                found.bind(instance),
            )))),
            None => Err(runtime_error(
                method,
                format!("Undefined property '{}'.", method.lexeme),
            )),
        }
    }

    /// Fields shadow getters, which shadow methods.
    fn get_property(
        &mut self,
        instance: &Rc<Instance>,
        name: &Token,
        output: &mut dyn Write,
    ) -> Result<Value, LoxError> {
        if let Some(value) = instance.field(&name.lexeme) {
            return Ok(value);
        }

        if let Some(getter) = instance.class.find_getter(&name.lexeme) {
            let bound = getter.bind(Rc::clone(instance));
            return self.call_function(&bound, Vec::new(), output);
        }

        if let Some(method) = instance.class.find_method(&name.lexeme) {
            let bound = method.bind(Rc::clone(instance));
            return Ok(Value::Function(Rc::new(Function::User(bound))));
        }

        Err(runtime_error(
            name,
            format!("Undefined property '{}'.", name.lexeme),
        ))
    }

    fn call_value(
        &mut self,
        callee: Value,
        arguments: Vec<Value>,
        paren: &Token,
        output: &mut dyn Write,
    ) -> Result<Value, LoxError> {
        match callee {
            Value::Function(function) => {
                check_arity(function.arity(), arguments.len(), paren)?;
                match function.as_ref() {
                    Function::Native(native) => (native.func)(&arguments),
                    Function::User(user) => self.call_function(user, arguments, output),
                }
            }
            Value::Class(class) => {
                check_arity(class.arity(), arguments.len(), paren)?;
                let instance = Rc::new(Instance::new(Rc::clone(&class)));
                if let Some(initializer) = class.find_method(INITIALIZER_NAME) {
                    let bound = initializer.bind(Rc::clone(&instance));
                    self.call_function(&bound, arguments, output)?;
                }
                Ok(Value::Instance(instance))
            }
            _ => Err(runtime_error(paren, "Can only call functions and classes.")),
        }
    }

    /// Runs the body in one fresh frame holding the parameters, whose parent
    /// is the closure rather than the caller.
    fn call_function(
        &mut self,
        function: &LoxFunction,
        arguments: Vec<Value>,
        output: &mut dyn Write,
    ) -> Result<Value, LoxError> {
        debug!(
            "call {} with {} arguments",
            function.name(),
            arguments.len()
        );

        let mut frame = Environment::new(function.closure.clone());
        for (slot, argument) in arguments.into_iter().enumerate() {
            frame.define(slot, argument);
        }

        let flow = self.execute_block(
            &function.declaration.body,
            Rc::new(RefCell::new(frame)),
            output,
        )?;

        let value = match flow {
            Flow::Return(value) => value,
            Flow::Normal => Value::Nil,
            Flow::Break => panic!("'break' escaped function {}", function.name()),
        };

        if function.is_initializer {
            let Some(this_frame) = &function.closure else {
                panic!("initializer {} called without a bound instance", function.name());
            };
            return Ok(Environment::get_at(this_frame, 0, 0));
        }

        debug!("return from {} with {}", function.name(), value);
        Ok(value)
    }
}

fn check_arity(expected: usize, got: usize, paren: &Token) -> Result<(), LoxError> {
    if expected != got {
        return Err(runtime_error(
            paren,
            format!("Expected {} arguments but got {}.", expected, got),
        ));
    }
    Ok(())
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => format!("string \"{}\"", s),
        Value::Number(_) | Value::Bool(_) => format!("{} {}", value.type_name(), value),
        Value::Nil => "nil".to_string(),
        other => other.to_string(),
    }
}

fn binary(operator: &Token, left: Value, right: Value) -> Result<Value, LoxError> {
    use Value::{Bool, Number};

    match (operator.token_type, &left, &right) {
        (TokenType::EqualEqual, _, _) => return Ok(Bool(left == right)),
        (TokenType::BangEqual, _, _) => return Ok(Bool(left != right)),
        (TokenType::Plus, Number(a), Number(b)) => return Ok(Number(a + b)),
        (TokenType::Plus, Value::String(a), Value::String(b)) => {
            return Ok(Value::String(format!("{}{}", a, b)));
        }
        (TokenType::Plus, _, _) => {
            return Err(runtime_error(
                operator,
                format!(
                    "Operands of '+' must be two numbers or two strings, got {} and {}.",
                    describe(&left),
                    describe(&right)
                ),
            ));
        }
        _ => {}
    }

    let (Number(a), Number(b)) = (&left, &right) else {
        return Err(runtime_error(
            operator,
            format!(
                "Operands of '{}' must be numbers, got {} and {}.",
                operator.lexeme,
                describe(&left),
                describe(&right)
            ),
        ));
    };
    let (a, b) = (*a, *b);

    Ok(match operator.token_type {
        TokenType::Minus => Number(a - b),
        TokenType::Star => Number(a * b),
        TokenType::Slash => Number(a / b),
        TokenType::Greater => Bool(a > b),
        TokenType::GreaterEqual => Bool(a >= b),
        TokenType::Less => Bool(a < b),
        TokenType::LessEqual => Bool(a <= b),
        _ => unreachable!("parser never builds binary '{}'", operator.lexeme),
    })
}
