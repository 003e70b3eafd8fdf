use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::ast::{Expr, ExprId, FunctionDecl, Stmt};
use crate::error::{LoxError, Warning};
use crate::token::{Span, Token};
use crate::value::INITIALIZER_NAME;

/// Maps each resolved reference to its (distance, slot) address:
/// - distance: how many frames to walk up
/// - slot: index within that frame
///
/// References missing from the table are globals.
pub type Resolutions = HashMap<ExprId, (usize, usize)>;

/// Everything one resolver pass found.
#[derive(Debug, Default)]
pub struct Resolution {
    pub locals: Resolutions,
    pub errors: Vec<LoxError>,
    pub warnings: Vec<Warning>,
}

impl Resolution {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FunctionType {
    None,
    Function,
    Method,
    Initializer,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ClassType {
    None,
    Class,
    Subclass,
    StaticMethod,
}

/// Where the walk currently is. Passed down by value and overridden locally.
#[derive(Debug, Clone, Copy)]
struct Context {
    function: FunctionType,
    class: ClassType,
}

impl Context {
    const TOP_LEVEL: Context = Context {
        function: FunctionType::None,
        class: ClassType::None,
    };

    fn in_function(self, function: FunctionType) -> Self {
        Context { function, ..self }
    }

    fn in_class(self, class: ClassType) -> Self {
        Context { class, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BindingKind {
    Local,
    Parameter,
    Synthetic,
}

#[derive(Debug, Clone)]
struct VarInfo {
    defined: bool,
    used: bool,
    line: usize,
    span: Span,
    slot: usize,
    kind: BindingKind,
}

pub struct Resolver {
    /// Innermost scope last. Empty at the top level, where bindings are globals.
    scopes: Vec<HashMap<String, VarInfo>>,
    locals: Resolutions,
    errors: Vec<LoxError>,
    warnings: Vec<Warning>,
    report_unused: bool,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            scopes: Vec::new(),
            locals: HashMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            report_unused: true,
        }
    }

    pub fn report_unused(mut self, report_unused: bool) -> Self {
        self.report_unused = report_unused;
        self
    }

    /// Resolves a whole program, collecting every static error instead of
    /// stopping at the first one.
    pub fn resolve(mut self, statements: &[Stmt]) -> Resolution {
        self.resolve_stmts(statements, Context::TOP_LEVEL);
        Resolution {
            locals: self.locals,
            errors: self.errors,
            warnings: self.warnings,
        }
    }

    fn error(&mut self, token: &Token, message: &str) {
        self.errors.push(LoxError::Resolution {
            message: format!("at '{}': {}", token.lexeme, message),
            line: token.line,
            span: token.span.clone(),
        });
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        let Some(scope) = self.scopes.pop() else {
            return;
        };
        if !self.report_unused {
            return;
        }

        let mut unused: Vec<(String, VarInfo)> = scope
            .into_iter()
            .filter(|(name, info)| {
                !info.used && info.kind == BindingKind::Local && !name.starts_with('_')
            })
            .collect();
        unused.sort_by_key(|(_, info)| info.span.start);

        for (name, info) in unused {
            self.warnings.push(Warning {
                message: format!(
                    "Local variable '{}' is never used. Prefix it with '_' if that is intentional.",
                    name
                ),
                line: info.line,
                span: info.span,
            });
        }
    }

    /// Adds `name` to the innermost scope under the next free slot.
    fn declare(&mut self, name: &Token, kind: BindingKind) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if scope.contains_key(&name.lexeme) {
            self.error(name, "Already a variable with this name in this scope.");
            return;
        }
        let slot = scope.len();
        scope.insert(
            name.lexeme.clone(),
            VarInfo {
                defined: false,
                used: false,
                line: name.line,
                span: name.span.clone(),
                slot,
                kind,
            },
        );
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut()
            && let Some(info) = scope.get_mut(&name.lexeme)
        {
            info.defined = true;
        }
    }

    /// Opens a scope holding one synthetic binding at slot 0.
    fn begin_synthetic_scope(&mut self, name: &str, at: &Token) {
        self.begin_scope();
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(
                name.to_string(),
                VarInfo {
                    defined: true,
                    used: true,
                    line: at.line,
                    span: at.span.clone(),
                    slot: 0,
                    kind: BindingKind::Synthetic,
                },
            );
        }
    }

    fn resolve_local(&mut self, id: ExprId, name: &Token, is_read: bool) {
        for (distance, scope) in self.scopes.iter_mut().rev().enumerate() {
            if let Some(info) = scope.get_mut(&name.lexeme) {
                if is_read {
                    info.used = true;
                }
                debug!(
                    "resolved '{}' on line {} to distance {} slot {}",
                    name.lexeme, name.line, distance, info.slot
                );
                self.locals.insert(id, (distance, info.slot));
                return;
            }
        }
        debug!("'{}' on line {} is global", name.lexeme, name.line);
    }

    fn resolve_stmts(&mut self, statements: &[Stmt], ctx: Context) {
        for stmt in statements {
            self.resolve_stmt(stmt, ctx);
        }
    }

    fn resolve_stmt(&mut self, stmt: &Stmt, ctx: Context) {
        match stmt {
            Stmt::Block { statements } => {
                self.begin_scope();
                self.resolve_stmts(statements, ctx);
                self.end_scope();
            }
            Stmt::Var { name, initializer } => {
                self.declare(name, BindingKind::Local);
                if let Some(init) = initializer {
                    self.resolve_expr(init, ctx);
                }
                self.define(name);
            }
            Stmt::Function(decl) => {
                self.declare(&decl.name, BindingKind::Local);
                self.define(&decl.name);
                self.resolve_function(decl, FunctionType::Function, ctx);
            }
            Stmt::Expression { expression } | Stmt::Print { expression } => {
                self.resolve_expr(expression, ctx);
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition, ctx);
                self.resolve_stmt(then_branch, ctx);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch, ctx);
                }
            }
            Stmt::While { condition, body } => {
                self.resolve_expr(condition, ctx);
                self.resolve_stmt(body, ctx);
            }
            Stmt::Break { .. } => {}
            Stmt::Return { keyword, value } => {
                if ctx.function == FunctionType::None {
                    self.error(keyword, "Can't return from top-level code.");
                }
                if let Some(value) = value {
                    if ctx.function == FunctionType::Initializer {
                        self.error(keyword, "Can't return a value from an initializer.");
                    }
                    self.resolve_expr(value, ctx);
                }
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.resolve_class(name, superclass.as_ref(), methods, ctx),
        }
    }

    fn resolve_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<FunctionDecl>],
        ctx: Context,
    ) {
        self.declare(name, BindingKind::Local);
        self.define(name);

        if let Some(superclass) = superclass {
            if let Expr::Variable {
                name: superclass_name,
                ..
            } = superclass
                && superclass_name.lexeme == name.lexeme
            {
                self.error(superclass_name, "A class can't inherit from itself.");
            }
            self.resolve_expr(superclass, ctx);
        }

        // Static methods see neither `this` nor `super`, so they close over the
        // scope the class is declared in.
        let static_ctx = ctx.in_class(ClassType::StaticMethod);
        for method in methods.iter().filter(|m| m.is_static) {
            self.resolve_function(method, FunctionType::Method, static_ctx);
        }

        let class_ctx = if superclass.is_some() {
            self.begin_synthetic_scope("super", name);
            ctx.in_class(ClassType::Subclass)
        } else {
            ctx.in_class(ClassType::Class)
        };
        self.begin_synthetic_scope("this", name);

        for method in methods.iter().filter(|m| !m.is_static) {
            let function = if !method.is_getter && method.name.lexeme == INITIALIZER_NAME {
                FunctionType::Initializer
            } else {
                FunctionType::Method
            };
            self.resolve_function(method, function, class_ctx);
        }

        self.end_scope();
        if superclass.is_some() {
            self.end_scope();
        }
    }

    /// Parameters and body locals share one scope, matching the single frame
    /// a call creates.
    fn resolve_function(&mut self, decl: &FunctionDecl, function: FunctionType, ctx: Context) {
        let ctx = ctx.in_function(function);

        self.begin_scope();
        for param in &decl.params {
            self.declare(param, BindingKind::Parameter);
            self.define(param);
        }
        self.resolve_stmts(&decl.body, ctx);
        self.end_scope();
    }

    fn resolve_expr(&mut self, expr: &Expr, ctx: Context) {
        match expr {
            Expr::Variable { id, name } => {
                if let Some(scope) = self.scopes.last()
                    && scope.get(&name.lexeme).is_some_and(|info| !info.defined)
                {
                    self.error(name, "Can't read local variable in its own initializer.");
                }
                self.resolve_local(*id, name, true);
            }
            Expr::Assign { id, name, value } => {
                self.resolve_expr(value, ctx);
                self.resolve_local(*id, name, false);
            }
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left, ctx);
                self.resolve_expr(right, ctx);
            }
            Expr::Unary { right, .. } => self.resolve_expr(right, ctx),
            Expr::Grouping { expression } => self.resolve_expr(expression, ctx),
            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee, ctx);
                for argument in arguments {
                    self.resolve_expr(argument, ctx);
                }
            }
            Expr::Literal { .. } => {}
            Expr::Get { object, .. } => self.resolve_expr(object, ctx),
            Expr::Set { object, value, .. } => {
                self.resolve_expr(value, ctx);
                self.resolve_expr(object, ctx);
            }
            Expr::This { id, keyword } => {
                match ctx.class {
                    ClassType::None => {
                        self.error(keyword, "Can't use 'this' outside of a class.");
                        return;
                    }
                    ClassType::StaticMethod => {
                        self.error(keyword, "Can't use 'this' in a static method.");
                        return;
                    }
                    ClassType::Class | ClassType::Subclass => {}
                }
                self.resolve_local(*id, keyword, true);
            }
            Expr::Super { id, keyword, .. } => {
                match ctx.class {
                    ClassType::None => {
                        self.error(keyword, "Can't use 'super' outside of a class.");
                        return;
                    }
                    ClassType::Class => {
                        self.error(
                            keyword,
                            "Can't use 'super' in a class with no superclass.",
                        );
                        return;
                    }
                    ClassType::StaticMethod => {
                        self.error(keyword, "Can't use 'super' in a static method.");
                        return;
                    }
                    ClassType::Subclass => {}
                }
                self.resolve_local(*id, keyword, true);
            }
        }
    }
}
