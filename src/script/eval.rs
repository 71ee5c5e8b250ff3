/*!
 * Evaluator
 * Tree-walking execution of statements against a namespace
 *
 * Statements may rebind names and therefore take `&mut Namespace`;
 * expressions only read it, so native functions and nested calls share
 * one immutable borrow.
 */

use super::ast::{Expr, FunctionDef, Stmt, UnaryOp};
use super::error::{ErrorKind, ScriptError, ScriptResult};
use super::namespace::{Args, Namespace, Object, ScriptFunction};
use super::ops;
use super::parser::parse_program;
use crate::core::limits::MAX_CALL_DEPTH;
use crate::modules::{catalog, BUILTINS};
use crate::protocol::{Kwargs, Value};
use ahash::{HashMap, HashMapExt};
use std::sync::Arc;

type Locals = HashMap<String, Object>;

/// Parse and execute `source`; yields the value of a trailing bare
/// expression, or `None`
pub fn run(ns: &mut Namespace, source: &str) -> ScriptResult<Object> {
    let program = parse_program(source)?;
    exec_program(ns, &program)
}

pub fn exec_program(ns: &mut Namespace, program: &[Stmt]) -> ScriptResult<Object> {
    let mut last = Object::Value(Value::None);
    for stmt in program {
        last = exec(ns, stmt)?.unwrap_or(Object::Value(Value::None));
    }
    Ok(last)
}

/// Execute one statement; bare expressions yield their value
pub fn exec(ns: &mut Namespace, stmt: &Stmt) -> ScriptResult<Option<Object>> {
    match stmt {
        Stmt::Def(def) => {
            let function = make_function(&Evaluator::global(ns), def)?;
            if let Some(name) = &def.name {
                ns.set(name.clone(), function);
            }
            Ok(None)
        }
        Stmt::Import { module, alias } => {
            let full = catalog().import(module, ns.is_isolated())?;
            ns.mark_imported(module);
            match alias {
                Some(alias) => ns.set(alias.clone(), Object::Module(full)),
                None => {
                    let top = top_level(module);
                    let top_module = catalog().import(top, ns.is_isolated())?;
                    ns.set(top.to_string(), Object::Module(top_module));
                }
            }
            Ok(None)
        }
        Stmt::FromImport {
            module,
            name,
            alias,
        } => {
            let source = catalog().import(module, ns.is_isolated())?;
            ns.mark_imported(module);
            let qualified = format!("{}.{}", module, name);
            let object = match source.member(name) {
                Some(object) => object,
                None if catalog().contains(&qualified) => {
                    let sub = catalog().import(&qualified, ns.is_isolated())?;
                    ns.mark_imported(&qualified);
                    Object::Module(sub)
                }
                None => {
                    return Err(ScriptError::new(
                        ErrorKind::ImportError,
                        format!("cannot import name '{}' from '{}'", name, module),
                    ))
                }
            };
            ns.set(alias.clone().unwrap_or_else(|| name.clone()), object);
            Ok(None)
        }
        Stmt::Assign { target, value } => {
            let object = Evaluator::global(ns).eval(value)?;
            ns.set(target.clone(), object);
            Ok(None)
        }
        Stmt::Expr(expr) => Evaluator::global(ns).eval(expr).map(Some),
    }
}

/// Evaluate an expression at top level
pub fn eval_expr(ns: &Namespace, expr: &Expr) -> ScriptResult<Object> {
    Evaluator::global(ns).eval(expr)
}

/// Call `callee` with already evaluated arguments
pub fn invoke(
    ns: &Namespace,
    callee: &Object,
    args: Vec<Object>,
    kwargs: Vec<(String, Object)>,
) -> ScriptResult<Object> {
    call_object(ns, callee, args, kwargs, 0)
}

/// Call `callee` with plain data and require plain data back
pub fn call_with_values(
    ns: &Namespace,
    callee: &Object,
    args: &[Value],
    kwargs: &Kwargs,
) -> ScriptResult<Value> {
    let args = args.iter().cloned().map(Object::Value).collect();
    let kwargs = kwargs
        .iter()
        .map(|(k, v)| (k.clone(), Object::Value(v.clone())))
        .collect();
    invoke(ns, callee, args, kwargs)?.into_value()
}

/// First segment of a dotted module name
pub fn top_level(module: &str) -> &str {
    module.split('.').next().unwrap_or(module)
}

struct Evaluator<'a> {
    globals: &'a Namespace,
    locals: Option<&'a Locals>,
    depth: usize,
}

impl<'a> Evaluator<'a> {
    fn global(globals: &'a Namespace) -> Self {
        Self {
            globals,
            locals: None,
            depth: 0,
        }
    }

    fn eval(&self, expr: &Expr) -> ScriptResult<Object> {
        match expr {
            Expr::Literal(value) => Ok(Object::Value(value.clone())),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval_value(item))
                    .collect::<ScriptResult<Vec<_>>>()?;
                Ok(Object::Value(Value::List(values)))
            }
            Expr::Dict(entries) => {
                let mut map = Kwargs::new();
                for (key, value) in entries {
                    let key = match self.eval_value(key)? {
                        Value::Str(s) => s,
                        other => {
                            return Err(ScriptError::type_error(format!(
                                "dict keys must be str, not {}",
                                other.type_name()
                            )))
                        }
                    };
                    map.insert(key, self.eval_value(value)?);
                }
                Ok(Object::Value(Value::Map(map)))
            }
            Expr::Name(name) => self.lookup(name),
            Expr::Attribute { object, name } => {
                let base = self.eval(object)?;
                attribute(self.globals, &base, name)
            }
            Expr::Call {
                callee,
                args,
                kwargs,
            } => self.eval_call(callee, args, kwargs),
            Expr::Index { object, index } => {
                let container = self.eval_value(object)?;
                let key = self.eval_value(index)?;
                ops::index(&container, &key).map(Object::Value)
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => Ok(Object::Value(Value::Bool(!self.eval(operand)?.is_truthy()))),
                UnaryOp::Neg => ops::negate(&self.eval_value(operand)?).map(Object::Value),
            },
            Expr::Binary { op, left, right } => {
                let left = self.eval_value(left)?;
                let right = self.eval_value(right)?;
                ops::binary(*op, &left, &right).map(Object::Value)
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Lambda(def) => make_function(self, def),
        }
    }

    fn eval_value(&self, expr: &Expr) -> ScriptResult<Value> {
        match self.eval(expr)? {
            Object::Value(v) => Ok(v),
            other => Err(ScriptError::type_error(format!(
                "{} object cannot be used as a value here",
                other.type_name()
            ))),
        }
    }

    fn lookup(&self, name: &str) -> ScriptResult<Object> {
        if let Some(object) = self.locals.and_then(|locals| locals.get(name)) {
            return Ok(object.clone());
        }
        if let Some(object) = self.globals.get(name) {
            return Ok(object.clone());
        }
        catalog()
            .get(BUILTINS)
            .and_then(|builtins| builtins.member(name))
            .ok_or_else(|| ScriptError::name(name))
    }

    fn is_bound(&self, name: &str) -> bool {
        self.locals.is_some_and(|locals| locals.contains_key(name)) || self.globals.contains(name)
    }

    fn eval_call(
        &self,
        callee: &Expr,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> ScriptResult<Object> {
        let args = args
            .iter()
            .map(|a| self.eval(a))
            .collect::<ScriptResult<Vec<_>>>()?;
        let kwargs = kwargs
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.eval(v)?)))
            .collect::<ScriptResult<Vec<_>>>()?;

        if matches!(callee, Expr::Name(n) if n == "getattr" && !self.is_bound(n)) {
            return builtin_getattr(self.globals, args, kwargs);
        }

        let callee = self.eval(callee)?;
        call_object(self.globals, &callee, args, kwargs, self.depth)
    }
}

fn make_function(evaluator: &Evaluator<'_>, def: &Arc<FunctionDef>) -> ScriptResult<Object> {
    let defaults = def
        .params
        .iter()
        .map(|p| p.default.as_ref().map(|d| evaluator.eval(d)).transpose())
        .collect::<ScriptResult<Vec<_>>>()?;
    let captured = evaluator.locals.cloned().unwrap_or_default();
    Ok(Object::Function(Arc::new(ScriptFunction {
        def: Arc::clone(def),
        defaults,
        captured,
    })))
}

fn call_object(
    globals: &Namespace,
    callee: &Object,
    args: Vec<Object>,
    kwargs: Vec<(String, Object)>,
    depth: usize,
) -> ScriptResult<Object> {
    match callee {
        Object::Native(native) => {
            let positional = args
                .into_iter()
                .map(|a| plain_argument(&native.name, a))
                .collect::<ScriptResult<Vec<_>>>()?;
            let mut keywords = Kwargs::new();
            for (k, v) in kwargs {
                keywords.insert(k, plain_argument(&native.name, v)?);
            }
            native
                .call(globals, Args::new(positional, keywords))
                .map(Object::Value)
        }
        Object::Function(function) => {
            if depth >= MAX_CALL_DEPTH {
                return Err(ScriptError::new(
                    ErrorKind::RecursionError,
                    "maximum recursion depth exceeded",
                ));
            }
            let locals = bind_parameters(function, args, kwargs)?;
            let evaluator = Evaluator {
                globals,
                locals: Some(&locals),
                depth: depth + 1,
            };
            evaluator.eval(&function.def.body)
        }
        other => Err(ScriptError::type_error(format!(
            "'{}' object is not callable",
            other.type_name()
        ))),
    }
}

fn plain_argument(func: &str, object: Object) -> ScriptResult<Value> {
    match object {
        Object::Value(v) => Ok(v),
        other => Err(ScriptError::type_error(format!(
            "{}() argument must be plain data, not {}",
            func,
            other.type_name()
        ))),
    }
}

fn bind_parameters(
    function: &ScriptFunction,
    args: Vec<Object>,
    kwargs: Vec<(String, Object)>,
) -> ScriptResult<Locals> {
    let def = &function.def;
    let name = def.display_name();
    if args.len() > def.params.len() {
        return Err(ScriptError::type_error(format!(
            "{}() takes {} positional arguments but {} were given",
            name,
            def.params.len(),
            args.len()
        )));
    }

    let mut locals = function.captured.clone();
    let mut kwargs: HashMap<String, Object> = {
        let mut map = HashMap::with_capacity(kwargs.len());
        for (k, v) in kwargs {
            if !def.params.iter().any(|p| p.name == k) {
                return Err(ScriptError::type_error(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    name, k
                )));
            }
            map.insert(k, v);
        }
        map
    };
    let mut args = args.into_iter();

    for (i, param) in def.params.iter().enumerate() {
        let value = match args.next() {
            Some(value) => {
                if kwargs.contains_key(&param.name) {
                    return Err(ScriptError::type_error(format!(
                        "{}() got multiple values for argument '{}'",
                        name, param.name
                    )));
                }
                value
            }
            None => match kwargs.remove(&param.name) {
                Some(value) => value,
                None => match function.defaults.get(i).cloned().flatten() {
                    Some(default) => default,
                    None => {
                        return Err(ScriptError::type_error(format!(
                            "{}() missing required argument: '{}'",
                            name, param.name
                        )))
                    }
                },
            },
        };
        locals.insert(param.name.clone(), value);
    }
    Ok(locals)
}

/// Attribute access; submodules are visible only once imported
pub fn attribute(ns: &Namespace, base: &Object, name: &str) -> ScriptResult<Object> {
    match base {
        Object::Module(module) => {
            if let Some(member) = module.member(name) {
                return Ok(member);
            }
            let qualified = format!("{}.{}", module.name(), name);
            if ns.has_imported(&qualified) {
                if let Some(sub) = catalog().get(&qualified) {
                    return Ok(Object::Module(sub));
                }
            }
            Err(ScriptError::new(
                ErrorKind::AttributeError,
                format!("module '{}' has no attribute '{}'", module.name(), name),
            ))
        }
        other => Err(ScriptError::new(
            ErrorKind::AttributeError,
            format!("'{}' object has no attribute '{}'", other.type_name(), name),
        )),
    }
}

fn builtin_getattr(
    ns: &Namespace,
    args: Vec<Object>,
    kwargs: Vec<(String, Object)>,
) -> ScriptResult<Object> {
    if !kwargs.is_empty() || !(2..=3).contains(&args.len()) {
        return Err(ScriptError::type_error(
            "getattr() takes an object, a name and an optional default",
        ));
    }
    let mut args = args.into_iter();
    let (Some(base), Some(name)) = (args.next(), args.next()) else {
        return Err(ScriptError::type_error("getattr() missing arguments"));
    };
    let name = match name {
        Object::Value(Value::Str(s)) => s,
        other => {
            return Err(ScriptError::type_error(format!(
                "attribute name must be string, not '{}'",
                other.type_name()
            )))
        }
    };
    match (attribute(ns, &base, &name), args.next()) {
        (Err(e), Some(default)) if e.kind == ErrorKind::AttributeError => Ok(default),
        (result, _) => result,
    }
}
