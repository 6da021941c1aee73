use crate::ast::{Expr, ExprId, FunctionDecl, Program, Stmt};
use crate::error::SprigError;
use crate::lexer::Token;
use std::collections::HashMap;

/// Map from expression identity to lexical distance (0 = innermost).
/// Absence means the reference resolves as a global.
pub type Resolutions = HashMap<ExprId, usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockType {
    None,
    Loop,
    Function,
    Method,
    Initializer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassType {
    None,
    Class,
    Subclass,
}

/// Second, read-only pass over the AST: computes static scope distances
/// and rejects statically detectable misuse. Violations accumulate; the
/// pass always walks the whole tree.
pub struct Resolver {
    scopes: Vec<HashMap<String, bool>>,
    nested_blocks: Vec<BlockType>,
    current_class: ClassType,
    resolutions: Resolutions,
    errors: Vec<SprigError>,
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            scopes: Vec::new(),
            nested_blocks: vec![BlockType::None],
            current_class: ClassType::None,
            resolutions: Resolutions::new(),
            errors: Vec::new(),
        }
    }

    pub fn resolve(mut self, program: &Program) -> Result<Resolutions, Vec<SprigError>> {
        for statement in &program.statements {
            self.resolve_stmt(statement);
        }

        if self.errors.is_empty() {
            Ok(self.resolutions)
        } else {
            Err(self.errors)
        }
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression { expr } | Stmt::Print { expr } => self.resolve_expr(expr),
            Stmt::Var { name, initializer } => {
                self.declare(name);
                if let Some(initializer) = initializer {
                    self.resolve_expr(initializer);
                }
                self.define(name);
            }
            Stmt::Block { statements } => {
                self.begin_scope();
                for statement in statements {
                    self.resolve_stmt(statement);
                }
                self.end_scope();
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch);
                }
            }
            Stmt::While {
                condition,
                body,
                increment,
            } => {
                self.nested_blocks.push(BlockType::Loop);

                self.resolve_expr(condition);
                if let Some(increment) = increment {
                    self.resolve_expr(increment);
                }
                self.resolve_stmt(body);

                self.nested_blocks.pop();
            }
            Stmt::Foreach {
                iterator,
                iterable,
                index,
                body,
                ..
            } => {
                self.nested_blocks.push(BlockType::Loop);

                self.declare(iterator);
                self.define(iterator);
                self.resolve_expr(iterable);
                if let Some(index) = index {
                    self.declare(index);
                    self.define(index);
                }
                self.resolve_stmt(body);

                self.nested_blocks.pop();
            }
            Stmt::Function { decl } => {
                self.declare(&decl.name);
                self.define(&decl.name);
                self.resolve_function(decl, BlockType::Function);
            }
            Stmt::Class {
                name,
                superclass,
                methods,
            } => self.resolve_class(name, superclass.as_ref(), methods),
            Stmt::Return { keyword, value } => {
                let in_callable = self.nested_blocks.iter().any(|block| {
                    matches!(
                        block,
                        BlockType::Function | BlockType::Method | BlockType::Initializer
                    )
                });
                if !in_callable {
                    self.error(keyword, "Can't return outside methods or functions.");
                    return;
                }

                if let Some(value) = value {
                    if self.nested_blocks.contains(&BlockType::Initializer) {
                        self.error(keyword, "Can't return a value from an initializer.");
                        return;
                    }
                    self.resolve_expr(value);
                }
            }
            Stmt::Exit { keyword } => {
                let current = *self.nested_blocks.last().unwrap_or(&BlockType::None);
                if current == BlockType::None || current == BlockType::Function {
                    self.error(keyword, "'exit' can only be used inside loops.");
                }
            }
            Stmt::Next { keyword } => {
                let current = *self.nested_blocks.last().unwrap_or(&BlockType::None);
                if current == BlockType::None || current == BlockType::Function {
                    self.error(keyword, "'next' can only be used inside loops.");
                }
            }
        }
    }

    fn resolve_class(
        &mut self,
        name: &Token,
        superclass: Option<&Expr>,
        methods: &[std::rc::Rc<FunctionDecl>],
    ) {
        let current = *self.nested_blocks.last().unwrap_or(&BlockType::None);
        if current != BlockType::None || !self.scopes.is_empty() {
            self.error(name, "Classes can only be declared in the outermost scope.");
            return;
        }

        let enclosing_class = self.current_class;
        self.current_class = ClassType::Class;

        self.declare(name);
        self.define(name);

        if let Some(superclass_expr) = superclass {
            if let Expr::Variable {
                name: superclass_name,
                ..
            } = superclass_expr
            {
                if superclass_name.lexeme == name.lexeme {
                    self.error(superclass_name, "A class can't inherit itself.");
                    self.current_class = enclosing_class;
                    return;
                }
            }

            self.resolve_expr(superclass_expr);
            self.current_class = ClassType::Subclass;

            self.begin_scope();
            self.scopes
                .last_mut()
                .unwrap()
                .insert("super".to_string(), true);
        }

        self.begin_scope();
        self.scopes
            .last_mut()
            .unwrap()
            .insert("this".to_string(), true);

        for method in methods {
            let declaration = if method.name.lexeme == "init" {
                BlockType::Initializer
            } else {
                BlockType::Method
            };
            self.resolve_function(method, declaration);
        }

        self.end_scope();

        if superclass.is_some() {
            self.end_scope();
        }

        self.current_class = enclosing_class;
    }

    fn resolve_function(&mut self, function: &FunctionDecl, block_type: BlockType) {
        self.nested_blocks.push(block_type);

        self.begin_scope();
        for param in &function.params {
            self.declare(param);
            self.define(param);
        }
        for statement in &function.body {
            self.resolve_stmt(statement);
        }
        self.end_scope();

        self.nested_blocks.pop();
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal { .. } => {}
            Expr::Variable { name, id } => {
                if let Some(scope) = self.scopes.last() {
                    if scope.get(&name.lexeme) == Some(&false) {
                        self.error(name, "Can't read local variable in its own initializer.");
                    }
                }
                self.resolve_local(*id, name);
            }
            Expr::Assign { name, value, id } => {
                self.resolve_expr(value);
                self.resolve_local(*id, name);
            }
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Unary { right, .. } => self.resolve_expr(right),
            Expr::Grouping { expr } => self.resolve_expr(expr),
            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for argument in arguments {
                    self.resolve_expr(argument);
                }
            }
            Expr::Get { object, .. } => self.resolve_expr(object),
            Expr::PropertySet { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }
            Expr::Index {
                object, location, ..
            } => {
                self.resolve_expr(object);
                self.resolve_expr(location);
            }
            Expr::IndexAssign {
                name,
                depth,
                value,
                id,
            } => {
                self.resolve_expr(value);
                for location in depth {
                    self.resolve_expr(location);
                }
                self.resolve_local(*id, name);
            }
            Expr::Increment { name, id, .. } => self.resolve_local(*id, name),
            Expr::IndexIncrement {
                name, depth, id, ..
            } => {
                for location in depth {
                    self.resolve_expr(location);
                }
                self.resolve_local(*id, name);
            }
            Expr::SetLiteral { elements, .. } => {
                for element in elements {
                    self.resolve_expr(element);
                }
            }
            Expr::This { keyword, id } => {
                if self.current_class == ClassType::None {
                    self.error(keyword, "Can't use 'this' outside of a class.");
                    return;
                }
                self.resolve_local(*id, keyword);
            }
            Expr::Super { keyword, id, .. } => {
                if self.current_class == ClassType::None {
                    self.error(keyword, "Can't use 'super' outside of a class.");
                } else if self.current_class != ClassType::Subclass {
                    self.error(keyword, "Can't use 'super' in a class with no superclass.");
                }
                self.resolve_local(*id, keyword);
            }
        }
    }

    /* --- Scope bookkeeping --- */

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &Token) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };

        if scope.contains_key(&name.lexeme) {
            let error = SprigError::resolve_error(
                name.span.clone(),
                name.line,
                format!("Variable '{}' already exists in this scope.", name.lexeme),
            );
            self.errors.push(error);
        }

        scope.insert(name.lexeme.clone(), false);
    }

    fn define(&mut self, name: &Token) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.lexeme.clone(), true);
        }
    }

    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        for (i, scope) in self.scopes.iter().enumerate().rev() {
            if scope.contains_key(&name.lexeme) {
                self.resolutions.insert(id, self.scopes.len() - 1 - i);
                return;
            }
        }
    }

    fn error(&mut self, token: &Token, message: &str) {
        self.errors.push(SprigError::resolve_error(
            token.span.clone(),
            token.line,
            message.to_string(),
        ));
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}
