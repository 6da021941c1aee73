use crate::ast::{Expr, ExprId, LiteralValue, Program, Stmt};
use crate::error::SprigError;
use crate::lexer::{Token, TokenType};
use crate::natives;
use crate::resolver::Resolutions;
use crate::value::{expand_newlines, BoundNative, Class, Function, Instance, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// One scope in the lexical chain. Chains are shared: a closure keeps its
/// captured scope alive, and every holder sees the same bindings.
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            enclosing: None,
        }
    }

    pub fn with_enclosing(enclosing: Rc<RefCell<Environment>>) -> Self {
        Self {
            values: HashMap::new(),
            enclosing: Some(enclosing),
        }
    }

    /// Declares a new variable; redeclaration in the same scope is an error.
    pub fn define(&mut self, name: &Token, value: Value) -> Result<(), SprigError> {
        if self.values.contains_key(&name.lexeme) {
            return Err(SprigError::runtime_error(
                name.span.clone(),
                name.line,
                format!("Variable '{}' already exists.", name.lexeme),
            ));
        }

        self.values.insert(name.lexeme.clone(), value);
        Ok(())
    }

    /// Inserts without the redeclaration check; used for `this`, `super`,
    /// natives and loop bindings.
    pub fn hard_define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get_direct(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    pub fn get(env: &Rc<RefCell<Environment>>, name: &Token) -> Result<Value, SprigError> {
        let mut current = Rc::clone(env);
        loop {
            let found = current.borrow().values.get(&name.lexeme).cloned();
            if let Some(value) = found {
                return Ok(value);
            }

            let next = match current.borrow().enclosing.as_ref() {
                Some(parent) => Rc::clone(parent),
                None => {
                    return Err(SprigError::runtime_error(
                        name.span.clone(),
                        name.line,
                        format!("Undefined variable '{}'.", name.lexeme),
                    ))
                }
            };
            current = next;
        }
    }

    pub fn assign(
        env: &Rc<RefCell<Environment>>,
        name: &Token,
        value: Value,
    ) -> Result<(), SprigError> {
        let mut current = Rc::clone(env);
        loop {
            if current.borrow().values.contains_key(&name.lexeme) {
                current.borrow_mut().values.insert(name.lexeme.clone(), value);
                return Ok(());
            }

            let next = match current.borrow().enclosing.as_ref() {
                Some(parent) => Rc::clone(parent),
                None => {
                    return Err(SprigError::runtime_error(
                        name.span.clone(),
                        name.line,
                        format!("Undefined variable '{}'.", name.lexeme),
                    ))
                }
            };
            current = next;
        }
    }

    fn ancestor(env: &Rc<RefCell<Environment>>, distance: usize) -> Rc<RefCell<Environment>> {
        let mut current = Rc::clone(env);
        for _ in 0..distance {
            let next = match current.borrow().enclosing.as_ref() {
                Some(parent) => Rc::clone(parent),
                None => break,
            };
            current = next;
        }
        current
    }

    pub fn get_at(
        env: &Rc<RefCell<Environment>>,
        distance: usize,
        name: &str,
    ) -> Option<Value> {
        Environment::ancestor(env, distance)
            .borrow()
            .values
            .get(name)
            .cloned()
    }

    pub fn assign_at(
        env: &Rc<RefCell<Environment>>,
        distance: usize,
        name: &str,
        value: Value,
    ) {
        Environment::ancestor(env, distance)
            .borrow_mut()
            .values
            .insert(name.to_string(), value);
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// How a statement finished. Loop and function executors collapse the
/// non-Normal cases at their own boundary.
pub enum Flow {
    Normal,
    Returned(Value),
    Broke,
    Continued,
}

pub struct Evaluator {
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    locals: HashMap<ExprId, usize>,
}

impl Evaluator {
    pub fn new() -> Self {
        let globals = Rc::new(RefCell::new(Environment::new()));
        for native in natives::FUNCTIONS {
            globals
                .borrow_mut()
                .hard_define(native.name, Value::Native(native));
        }

        Self {
            environment: Rc::clone(&globals),
            globals,
            locals: HashMap::new(),
        }
    }

    /// Merges a resolution table in. Tables accumulate across runs so that
    /// closures from earlier REPL lines keep their distances.
    pub fn add_resolutions(&mut self, resolutions: Resolutions) {
        self.locals.extend(resolutions);
    }

    /// Reads a global binding; used by embedders and tests.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get_direct(name)
    }

    /// Runs a program. With `echo` set (REPL mode), bare expression
    /// statements print their stringified value.
    pub fn interpret(&mut self, program: &Program, echo: bool) -> Result<(), SprigError> {
        for statement in &program.statements {
            if echo {
                if let Stmt::Expression { expr } = statement {
                    let value = self.evaluate(expr)?;
                    let silent = matches!(
                        expr,
                        Expr::Assign { .. } | Expr::PropertySet { .. } | Expr::IndexAssign { .. }
                    );
                    if !silent {
                        println!("{}", value.stringify());
                    }
                    continue;
                }
            }
            self.execute(statement)?;
        }
        Ok(())
    }

    /* --- Statements --- */

    fn execute(&mut self, stmt: &Stmt) -> Result<Flow, SprigError> {
        match stmt {
            Stmt::Expression { expr } => {
                self.evaluate(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Print { expr } => {
                let value = self.evaluate(expr)?;
                println!("{}", expand_newlines(&value.stringify()));
                Ok(Flow::Normal)
            }
            Stmt::Var { name, initializer } => {
                let value = match initializer {
                    Some(initializer) => self.evaluate(initializer)?,
                    None => Value::Nil,
                };
                self.environment.borrow_mut().define(name, value)?;
                Ok(Flow::Normal)
            }
            Stmt::Block { statements } => {
                let inner = Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(
                    &self.environment,
                ))));
                self.execute_block(statements, inner)
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Stmt::While {
                condition,
                body,
                increment,
            } => {
                loop {
                    if !self.evaluate(condition)?.is_truthy() {
                        break;
                    }

                    let flow = self.execute(body)?;

                    // The increment clause runs after every iteration of
                    // the body, even one that breaks or continues.
                    if let Some(increment) = increment {
                        self.evaluate(increment)?;
                    }

                    match flow {
                        Flow::Broke => break,
                        Flow::Returned(value) => return Ok(Flow::Returned(value)),
                        Flow::Normal | Flow::Continued => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Foreach {
                iterator,
                iterable,
                iterable_name,
                index,
                body,
            } => self.execute_foreach(iterator, iterable, iterable_name, index.as_ref(), body),
            Stmt::Function { decl } => {
                let function = Function {
                    declaration: Rc::clone(decl),
                    closure: Rc::clone(&self.environment),
                    is_initializer: false,
                };
                self.environment
                    .borrow_mut()
                    .define(&decl.name, Value::Function(Rc::new(function)))?;
                Ok(Flow::Normal)
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => {
                self.execute_class(name, superclass.as_ref(), methods)?;
                Ok(Flow::Normal)
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(value) => self.evaluate(value)?,
                    None => Value::Nil,
                };
                Ok(Flow::Returned(value))
            }
            Stmt::Exit { .. } => Ok(Flow::Broke),
            Stmt::Next { .. } => Ok(Flow::Continued),
        }
    }

    pub fn execute_block(
        &mut self,
        statements: &[Stmt],
        environment: Rc<RefCell<Environment>>,
    ) -> Result<Flow, SprigError> {
        let previous = Rc::clone(&self.environment);
        self.environment = environment;

        let mut flow = Flow::Normal;
        for statement in statements {
            match self.execute(statement) {
                Ok(Flow::Normal) => {}
                Ok(other) => {
                    flow = other;
                    break;
                }
                Err(error) => {
                    self.environment = Rc::clone(&previous);
                    return Err(error);
                }
            }
        }

        self.environment = previous;
        Ok(flow)
    }

    fn execute_foreach(
        &mut self,
        iterator: &Token,
        iterable: &Expr,
        iterable_name: &Token,
        index: Option<&Token>,
        body: &Stmt,
    ) -> Result<Flow, SprigError> {
        enum Iterable {
            Set(Rc<RefCell<Vec<Value>>>),
            Chars(Vec<Value>),
        }

        let source = match self.evaluate(iterable)? {
            Value::Set(elements) => Iterable::Set(elements),
            Value::Str(s) => {
                Iterable::Chars(s.chars().map(|c| Value::Str(c.to_string())).collect())
            }
            other => {
                return Err(SprigError::runtime_error(
                    iterable_name.span.clone(),
                    iterable_name.line,
                    format!("Cannot iterate over {}", other.type_name()),
                ))
            }
        };

        // Loop bindings live in the current environment; references in the
        // body resolve one scope up from the body block, which is here.
        self.environment
            .borrow_mut()
            .hard_define(&iterator.lexeme, Value::Nil);
        if let Some(index) = index {
            self.environment
                .borrow_mut()
                .hard_define(&index.lexeme, Value::Number(0.0));
        }

        let mut position = 0usize;
        loop {
            // Length is re-read so the body may grow or shrink a set
            let element = match &source {
                Iterable::Set(elements) => elements.borrow().get(position).cloned(),
                Iterable::Chars(chars) => chars.get(position).cloned(),
            };
            let Some(element) = element else {
                break;
            };

            self.environment
                .borrow_mut()
                .hard_define(&iterator.lexeme, element);

            let flow = self.execute(body)?;

            // The advance step runs regardless of how the body finished:
            // after a break the index variable reads one past the end.
            position += 1;
            if let Some(index) = index {
                self.environment
                    .borrow_mut()
                    .hard_define(&index.lexeme, Value::Number(position as f64));
            }

            match flow {
                Flow::Broke => break,
                Flow::Returned(value) => return Ok(Flow::Returned(value)),
                Flow::Normal | Flow::Continued => {}
            }
        }

        Ok(Flow::Normal)
    }

    fn execute_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[Rc<crate::ast::FunctionDecl>],
    ) -> Result<(), SprigError> {
        let superclass_value = match superclass {
            Some(expr) => match self.evaluate(expr)? {
                Value::Class(class) => Some(class),
                _ => {
                    let token = match expr {
                        Expr::Variable { name, .. } => name,
                        _ => name,
                    };
                    return Err(SprigError::runtime_error(
                        token.span.clone(),
                        token.line,
                        "Superclass must be a class.".to_string(),
                    ));
                }
            },
            None => None,
        };

        self.environment.borrow_mut().define(name, Value::Nil)?;

        // Methods close over an extra scope binding `super` when there is
        // a superclass; `this` is bound per access, at bind time.
        let method_closure = match &superclass_value {
            Some(class) => {
                let mut environment = Environment::with_enclosing(Rc::clone(&self.environment));
                environment.hard_define("super", Value::Class(Rc::clone(class)));
                Rc::new(RefCell::new(environment))
            }
            None => Rc::clone(&self.environment),
        };

        let mut method_table = HashMap::new();
        for method in methods {
            let function = Function {
                declaration: Rc::clone(method),
                closure: Rc::clone(&method_closure),
                is_initializer: method.name.lexeme == "init",
            };
            method_table.insert(method.name.lexeme.clone(), function);
        }

        let class = Rc::new(Class {
            name: name.lexeme.clone(),
            superclass: superclass_value,
            methods: method_table,
        });

        Environment::assign(&self.environment, name, Value::Class(class))
    }

    /* --- Expressions --- */

    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value, SprigError> {
        match expr {
            Expr::Literal { value } => Ok(match value {
                LiteralValue::Nil => Value::Nil,
                LiteralValue::Bool(b) => Value::Bool(*b),
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::Str(s) => Value::Str(s.clone()),
            }),
            Expr::Variable { name, id } => self.look_up_variable(name, *id),
            Expr::Assign { name, value, id } => {
                let value = self.evaluate(value)?;
                self.assign_variable(name, *id, value.clone())?;
                Ok(value)
            }
            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                self.binary_op(operator, left, right)
            }
            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                let take_left = match operator.token_type {
                    TokenType::Or => left.is_truthy(),
                    _ => !left.is_truthy(),
                };
                if take_left {
                    Ok(left)
                } else {
                    self.evaluate(right)
                }
            }
            Expr::Unary { operator, right } => {
                let right = self.evaluate(right)?;
                match operator.token_type {
                    TokenType::Minus => match right {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        other => Err(self.error(
                            operator,
                            format!("Cannot negate {}", other.type_name()),
                        )),
                    },
                    _ => Ok(Value::Bool(!right.is_truthy())),
                }
            }
            Expr::Grouping { expr } => self.evaluate(expr),
            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee)?;
                let mut args = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    args.push(self.evaluate(argument)?);
                }
                self.call_value(callee, args, paren)
            }
            Expr::Get { object, name } => self.evaluate_get(object, name),
            Expr::PropertySet {
                object,
                name,
                value,
            } => {
                let object = self.evaluate(object)?;
                match object {
                    Value::Instance(instance) => {
                        let value = self.evaluate(value)?;
                        instance
                            .borrow_mut()
                            .fields
                            .insert(name.lexeme.clone(), value.clone());
                        Ok(value)
                    }
                    other => Err(self.error(
                        name,
                        format!("Only instances have fields, not {}", other.type_name()),
                    )),
                }
            }
            Expr::Index {
                object,
                bracket,
                location,
                ..
            } => {
                let object = self.evaluate(object)?;
                let location = self.evaluate(location)?;
                self.index_value(&object, &location, bracket)
            }
            Expr::IndexAssign {
                name,
                depth,
                value,
                id,
            } => self.index_assign(name, depth, value, *id),
            Expr::Increment { name, operator, id } => {
                let current = self.look_up_variable(name, *id)?;
                let updated = self.apply_increment(&current, operator, name)?;
                self.assign_variable(name, *id, updated.clone())?;
                Ok(updated)
            }
            Expr::IndexIncrement {
                name,
                depth,
                operator,
                id,
            } => self.index_increment(name, depth, operator, *id),
            Expr::SetLiteral { elements, .. } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.evaluate(element)?);
                }
                Ok(Value::Set(Rc::new(RefCell::new(values))))
            }
            Expr::This { keyword, id } => self.look_up_variable(keyword, *id),
            Expr::Super { keyword, method, id } => {
                let distance = *self.locals.get(id).unwrap_or(&0);
                let superclass = Environment::get_at(&self.environment, distance, "super");
                let instance =
                    Environment::get_at(&self.environment, distance.saturating_sub(1), "this");

                let (Some(Value::Class(superclass)), Some(Value::Instance(instance))) =
                    (superclass, instance)
                else {
                    return Err(self.error(keyword, "Can't use 'super' here.".to_string()));
                };

                match superclass.find_method(&method.lexeme) {
                    Some(found) => Ok(Value::Function(Rc::new(found.bind(&instance)))),
                    None => Err(self.error(
                        method,
                        format!("Undefined property '{}'.", method.lexeme),
                    )),
                }
            }
        }
    }

    fn evaluate_get(&mut self, object: &Expr, name: &Token) -> Result<Value, SprigError> {
        let object = self.evaluate(object)?;
        match object {
            Value::Instance(instance) => {
                // Fields shadow methods
                let field = instance.borrow().fields.get(&name.lexeme).cloned();
                if let Some(value) = field {
                    return Ok(value);
                }

                let method = instance
                    .borrow()
                    .class
                    .find_method(&name.lexeme)
                    .map(|method| method.bind(&instance));
                match method {
                    Some(bound) => Ok(Value::Function(Rc::new(bound))),
                    None => Err(self.error(
                        name,
                        format!("Undefined property '{}'.", name.lexeme),
                    )),
                }
            }
            receiver @ Value::Set(_) => match natives::set_method(&name.lexeme) {
                Some(native) => Ok(Value::BoundNative(Rc::new(BoundNative {
                    native,
                    receiver,
                }))),
                None => Err(self.error(
                    name,
                    format!("Undefined set method '{}'.", name.lexeme),
                )),
            },
            receiver @ Value::Str(_) => match natives::string_method(&name.lexeme) {
                Some(native) => Ok(Value::BoundNative(Rc::new(BoundNative {
                    native,
                    receiver,
                }))),
                None => Err(self.error(
                    name,
                    format!("Undefined string method '{}'.", name.lexeme),
                )),
            },
            other => Err(self.error(
                name,
                format!("Only instances have properties, not {}", other.type_name()),
            )),
        }
    }

    /* --- Calls --- */

    pub fn call_value(
        &mut self,
        callee: Value,
        arguments: Vec<Value>,
        paren: &Token,
    ) -> Result<Value, SprigError> {
        match callee {
            Value::Function(function) => {
                self.check_arity(function.arity(), arguments.len(), paren)?;
                self.call_function(&function, arguments)
            }
            Value::Class(class) => {
                self.check_arity(class.arity(), arguments.len(), paren)?;

                let instance = Rc::new(RefCell::new(Instance::new(Rc::clone(&class))));
                if let Some(initializer) = class.find_method("init") {
                    let bound = initializer.bind(&instance);
                    self.call_function(&bound, arguments)?;
                }
                Ok(Value::Instance(instance))
            }
            Value::Native(native) => {
                self.check_arity(native.arity, arguments.len(), paren)?;
                (native.func)(&arguments, paren)
            }
            Value::BoundNative(bound) => {
                self.check_arity(bound.native.arity, arguments.len(), paren)?;

                // The receiver travels on the bound value and becomes the
                // native's first argument.
                let mut full = Vec::with_capacity(arguments.len() + 1);
                full.push(bound.receiver.clone());
                full.extend(arguments);
                (bound.native.func)(&full, paren)
            }
            other => Err(self.error(
                paren,
                format!("Can only call functions and classes, not {}", other.type_name()),
            )),
        }
    }

    fn check_arity(&self, arity: i32, got: usize, paren: &Token) -> Result<(), SprigError> {
        if arity >= 0 && got != arity as usize {
            return Err(self.error(
                paren,
                format!("Expected {} arguments but got {}.", arity, got),
            ));
        }
        Ok(())
    }

    fn call_function(
        &mut self,
        function: &Function,
        arguments: Vec<Value>,
    ) -> Result<Value, SprigError> {
        let mut inner = Environment::with_enclosing(Rc::clone(&function.closure));
        for (param, argument) in function.declaration.params.iter().zip(arguments) {
            inner.define(param, argument)?;
        }

        let flow = self.execute_block(
            &function.declaration.body,
            Rc::new(RefCell::new(inner)),
        )?;

        // An initializer always yields the constructed instance, even
        // through a bare `return`.
        if function.is_initializer {
            return Ok(
                Environment::get_at(&function.closure, 0, "this").unwrap_or(Value::Nil)
            );
        }

        match flow {
            Flow::Returned(value) => Ok(value),
            _ => Ok(Value::Nil),
        }
    }

    /* --- Variables --- */

    fn look_up_variable(&self, name: &Token, id: ExprId) -> Result<Value, SprigError> {
        match self.locals.get(&id) {
            Some(distance) => Environment::get_at(&self.environment, *distance, &name.lexeme)
                .ok_or_else(|| {
                    SprigError::runtime_error(
                        name.span.clone(),
                        name.line,
                        format!("Undefined variable '{}'.", name.lexeme),
                    )
                }),
            None => Environment::get(&self.globals, name),
        }
    }

    fn assign_variable(&mut self, name: &Token, id: ExprId, value: Value) -> Result<(), SprigError> {
        match self.locals.get(&id) {
            Some(distance) => {
                Environment::assign_at(&self.environment, *distance, &name.lexeme, value);
                Ok(())
            }
            None => Environment::assign(&self.globals, name, value),
        }
    }

    /* --- Operators --- */

    fn binary_op(&self, operator: &Token, left: Value, right: Value) -> Result<Value, SprigError> {
        match operator.token_type {
            TokenType::Minus => self.arithmetic(operator, left, right, |l, r| l - r),
            TokenType::Star => self.arithmetic(operator, left, right, |l, r| l * r),
            TokenType::Slash => self.arithmetic(operator, left, right, |l, r| l / r),
            TokenType::Percent => self.arithmetic(operator, left, right, |l, r| l % r),
            TokenType::Plus => match (left, right) {
                (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l + r)),
                // Either side a string: concatenate the printed forms
                (l, r) if matches!(l, Value::Str(_)) || matches!(r, Value::Str(_)) => {
                    Ok(Value::Str(format!("{}{}", l.stringify(), r.stringify())))
                }
                (l, r) => Err(self.error(
                    operator,
                    format!("Cannot add {} and {}", l.type_name(), r.type_name()),
                )),
            },
            TokenType::Greater => self.comparison(operator, left, right, |o| o.is_gt()),
            TokenType::GreaterEqual => self.comparison(operator, left, right, |o| o.is_ge()),
            TokenType::Less => self.comparison(operator, left, right, |o| o.is_lt()),
            TokenType::LessEqual => self.comparison(operator, left, right, |o| o.is_le()),
            TokenType::EqualEqual => Ok(Value::Bool(left == right)),
            _ => Ok(Value::Bool(left != right)),
        }
    }

    fn arithmetic(
        &self,
        operator: &Token,
        left: Value,
        right: Value,
        apply: fn(f64, f64) -> f64,
    ) -> Result<Value, SprigError> {
        match (left, right) {
            (Value::Number(l), Value::Number(r)) => Ok(Value::Number(apply(l, r))),
            (l, r) => Err(self.error(
                operator,
                format!(
                    "Cannot apply '{}' to {} and {}",
                    operator.lexeme,
                    l.type_name(),
                    r.type_name()
                ),
            )),
        }
    }

    /// Ordering: numbers compare numerically; strings compare by length.
    fn comparison(
        &self,
        operator: &Token,
        left: Value,
        right: Value,
        accept: fn(std::cmp::Ordering) -> bool,
    ) -> Result<Value, SprigError> {
        let ordering = match (&left, &right) {
            (Value::Number(l), Value::Number(r)) => l.partial_cmp(r),
            (Value::Str(l), Value::Str(r)) => l.chars().count().partial_cmp(&r.chars().count()),
            _ => None,
        };

        match ordering {
            Some(ordering) => Ok(Value::Bool(accept(ordering))),
            None => Err(self.error(
                operator,
                format!(
                    "Cannot compare {} and {}",
                    left.type_name(),
                    right.type_name()
                ),
            )),
        }
    }

    fn apply_increment(
        &self,
        current: &Value,
        operator: &Token,
        anchor: &Token,
    ) -> Result<Value, SprigError> {
        let Value::Number(n) = current else {
            return Err(self.error(
                anchor,
                format!("Cannot apply '{}' to {}", operator.lexeme, current.type_name()),
            ));
        };

        Ok(Value::Number(match operator.token_type {
            TokenType::PlusPlus => n + 1.0,
            TokenType::MinusMinus => n - 1.0,
            TokenType::PlusPlusPlus => n * 2.0,
            _ => n / 2.0,
        }))
    }

    /* --- Indexing --- */

    /// Index conversion: non-negative indices wrap via modulo; negative
    /// indices are shifted by the length exactly once, and fault if still
    /// out of range. The asymmetry is part of the language.
    fn convert_index(
        &self,
        location: &Value,
        length: usize,
        anchor: &Token,
    ) -> Result<usize, SprigError> {
        let Value::Number(n) = location else {
            return Err(self.error(
                anchor,
                format!("Index must be a number, not {}", location.type_name()),
            ));
        };
        if n.fract() != 0.0 {
            return Err(self.error(anchor, "Index must be a whole number.".to_string()));
        }
        if length == 0 {
            return Err(self.error(anchor, "Index out of range.".to_string()));
        }

        let index = *n as i64;
        let length = length as i64;
        let converted = if index >= 0 {
            index % length
        } else {
            index + length
        };

        if converted < 0 || converted >= length {
            return Err(self.error(anchor, "Index out of range.".to_string()));
        }
        Ok(converted as usize)
    }

    fn index_value(
        &self,
        object: &Value,
        location: &Value,
        bracket: &Token,
    ) -> Result<Value, SprigError> {
        match object {
            Value::Set(elements) => {
                let index = self.convert_index(location, elements.borrow().len(), bracket)?;
                Ok(elements.borrow()[index].clone())
            }
            Value::Str(s) => {
                let index = self.convert_index(location, s.chars().count(), bracket)?;
                let c = s.chars().nth(index).unwrap_or_default();
                Ok(Value::Str(c.to_string()))
            }
            other => Err(self.error(
                bracket,
                format!("Cannot index {}", other.type_name()),
            )),
        }
    }

    /// Walks a reversed-depth index stack down to its write site. `depth`
    /// is outermost-first, so iteration runs back-to-front: every level
    /// but the last descends, the last one is handed to `write`.
    fn descend_indices(
        &mut self,
        name: &Token,
        depth: &[Expr],
        id: ExprId,
        write: &mut dyn FnMut(
            &mut Evaluator,
            &Rc<RefCell<Vec<Value>>>,
            usize,
        ) -> Result<Value, SprigError>,
    ) -> Result<Value, SprigError> {
        let mut current = self.look_up_variable(name, id)?;

        let levels = depth.len();
        for (step, location) in depth.iter().rev().enumerate() {
            let location = self.evaluate(location)?;

            let Value::Set(elements) = current else {
                return Err(self.error(
                    name,
                    format!("Cannot index {}", current.type_name()),
                ));
            };

            let index = self.convert_index(&location, elements.borrow().len(), name)?;
            if step == levels - 1 {
                return write(self, &elements, index);
            }

            let next = elements.borrow()[index].clone();
            current = next;
        }

        // depth is never empty: the parser only builds these from `[`
        Err(self.error(name, "Invalid index target.".to_string()))
    }

    fn index_assign(
        &mut self,
        name: &Token,
        depth: &[Expr],
        value: &Expr,
        id: ExprId,
    ) -> Result<Value, SprigError> {
        let anchor = name.clone();
        self.descend_indices(name, depth, id, &mut |evaluator, elements, index| {
            let value = evaluator.evaluate(value)?;
            // The value expression may have shrunk the set in the meantime
            match elements.borrow_mut().get_mut(index) {
                Some(slot) => *slot = value.clone(),
                None => {
                    return Err(evaluator.error(&anchor, "Index out of range.".to_string()))
                }
            }
            Ok(value)
        })
    }

    fn index_increment(
        &mut self,
        name: &Token,
        depth: &[Expr],
        operator: &Token,
        id: ExprId,
    ) -> Result<Value, SprigError> {
        let operator = operator.clone();
        self.descend_indices(name, depth, id, &mut |evaluator, elements, index| {
            let current = elements.borrow()[index].clone();
            let updated = evaluator.apply_increment(&current, &operator, &operator)?;
            elements.borrow_mut()[index] = updated.clone();
            Ok(updated)
        })
    }

    fn error(&self, token: &Token, message: String) -> SprigError {
        SprigError::runtime_error(token.span.clone(), token.line, message)
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}
