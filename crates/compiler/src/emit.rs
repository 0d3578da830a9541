//! Code generation: one pass over the expression tree.

use std::collections::HashMap;

use kenpali_common::{
    ArrayElement, ArrayPatternElement, Definition, Diagnostic, Expr, Library, ObjectElement,
    ObjectPatternElement, Opcode, Pattern, PlatformValue, Program, Value,
};
use tracing::{debug, trace};

use crate::error::CompileError;
use crate::function::{link, CompiledFunction, UpvalueRef};
use crate::library::{free_names, reachable};
use crate::scope::CompiledScope;
use crate::CompileOptions;

const MAIN: &str = "$main";
const ANONYMOUS: &str = "<anonymous>";

/// How a name reference is read.
enum Resolved {
    Local { depth: u32, slot: u32 },
    Upvalue(u32),
    Host(Value),
}

pub(crate) struct Emitter<'a> {
    library: &'a Library,
    options: &'a CompileOptions,
    scopes: Vec<CompiledScope>,
    /// Functions being compiled, outermost first. Never empty.
    functions: Vec<CompiledFunction>,
    /// Completed nested functions; function index `i` lives at `i - 1`.
    finished: Vec<CompiledFunction>,
    constants: Vec<Value>,
    strings: HashMap<String, u32>,
    platform_values: Vec<PlatformValue>,
    /// Compiling library definitions, which host names cannot shadow.
    in_library: bool,
}

impl<'a> Emitter<'a> {
    pub fn new(library: &'a Library, options: &'a CompileOptions) -> Self {
        Self {
            library,
            options,
            scopes: vec![CompiledScope::function()],
            functions: vec![CompiledFunction::new(MAIN, 0)],
            finished: Vec::new(),
            constants: Vec::new(),
            strings: HashMap::new(),
            platform_values: Vec::new(),
            in_library: false,
        }
    }

    /// Compile `expr` as the body of the main function and link the program.
    pub fn program(mut self, expr: &Expr) -> Result<Program, CompileError> {
        let roots = free_names(expr)
            .into_iter()
            .filter(|name| !self.options.names.contains_key(name))
            .collect();
        let retained = reachable(self.library, roots);

        if retained.is_empty() {
            self.expr(expr)?;
        } else {
            self.library_block(&retained, expr)?;
        }
        self.function().emit(Opcode::Return, &[]);

        let mut functions = self.functions;
        functions.append(&mut self.finished);
        let linked = link(functions);
        debug!(
            functions = linked.functions.len(),
            words = linked.code.len(),
            constants = self.constants.len(),
            platform_values = self.platform_values.len(),
            "linked program"
        );
        Ok(Program {
            code: linked.code,
            diagnostics: linked.diagnostics,
            constants: self.constants,
            platform_values: self.platform_values,
            functions: linked.functions,
        })
    }

    fn function(&mut self) -> &mut CompiledFunction {
        let last = self.functions.len() - 1;
        &mut self.functions[last]
    }

    fn scope(&mut self) -> &mut CompiledScope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    // ============================================================
    // Tables
    // ============================================================

    fn constant(&mut self, value: Value) -> Result<u32, CompileError> {
        if let Value::String(s) = &value {
            if let Some(&index) = self.strings.get(&**s) {
                return Ok(index);
            }
        }
        let index = table_index("constants", self.constants.len())?;
        if let Value::String(s) = &value {
            self.strings.insert(s.to_string(), index);
        }
        self.constants.push(value);
        Ok(index)
    }

    fn platform(&mut self, name: &str, value: Value) -> Result<u32, CompileError> {
        if let Some(index) = self
            .platform_values
            .iter()
            .position(|p| p.name == name && p.value == value)
        {
            return Ok(index as u32);
        }
        let index = table_index("platform values", self.platform_values.len())?;
        self.platform_values.push(PlatformValue {
            name: name.to_string(),
            value,
        });
        Ok(index)
    }

    /// Load a host-provided value: data as a constant, anything else by name.
    fn host_value(&mut self, name: &str, value: Value) -> Result<(), CompileError> {
        if value.is_data() {
            let k = self.constant(value)?;
            self.function().emit(Opcode::Value, &[k]);
        } else {
            let p = self.platform(name, value)?;
            self.function().emit(Opcode::Platform, &[p]);
        }
        Ok(())
    }

    // ============================================================
    // Name resolution
    // ============================================================

    fn resolve(&mut self, name: &str) -> Result<Resolved, CompileError> {
        for s in (0..self.scopes.len()).rev() {
            if self.scopes[s].library && !self.in_library {
                if let Some(value) = self.options.names.get(name) {
                    return Ok(Resolved::Host(value.clone()));
                }
            }
            if let Some(slot) = self.scopes[s].lookup(name) {
                return Ok(self.reach(s, slot));
            }
        }
        if !self.in_library {
            if let Some(value) = self.options.names.get(name) {
                return Ok(Resolved::Host(value.clone()));
            }
        }
        match self.library.get(name) {
            Some(Definition::Value(value)) => Ok(Resolved::Host(value.clone())),
            _ => Err(CompileError::NameNotDefined {
                name: name.to_string(),
            }),
        }
    }

    /// Reach slot `slot` of scope `s` from the current function, threading
    /// an upvalue through every function boundary in between.
    fn reach(&mut self, s: usize, slot: u32) -> Resolved {
        let crossed: Vec<usize> = (0..self.functions.len())
            .filter(|&f| self.functions[f].scope > s)
            .collect();
        let Some((&outermost, inner)) = crossed.split_first() else {
            let depth = (self.scopes.len() - 1 - s) as u32;
            return Resolved::Local { depth, slot };
        };

        self.scopes[s].capture(slot);
        let depth = (self.functions[outermost].scope - 1 - s) as u32;
        let mut index = self.functions[outermost].upvalue(UpvalueRef::Local { depth, slot });
        for &f in inner {
            index = self.functions[f].upvalue(UpvalueRef::Upvalue { index });
        }
        Resolved::Upvalue(index)
    }

    fn module_name(&mut self, name: &str, module: &str) -> Result<(), CompileError> {
        let exports = self
            .options
            .modules
            .get(module)
            .ok_or_else(|| CompileError::UnknownModule {
                module: module.to_string(),
                name: name.to_string(),
            })?;
        let value = exports
            .get(name)
            .cloned()
            .ok_or_else(|| CompileError::NameNotInModule {
                module: module.to_string(),
                name: name.to_string(),
            })?;
        self.host_value(name, value)
    }

    // ============================================================
    // Expressions
    // ============================================================

    fn expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Literal(value) => self.literal(value),
            Expr::Name { name, from: Some(module) } => self.module_name(name, module),
            Expr::Name { name, from: None } => self.name(name),
            Expr::Array(elements) => self.array(elements),
            Expr::Object(entries) => self.object(entries),
            Expr::Defining { definitions, result } => self.defining(definitions, result),
            Expr::Given {
                params,
                named_params,
                result,
            } => self.given(ANONYMOUS, params, named_params, result),
            Expr::Calling {
                callee,
                args,
                named_args,
            } => self.calling(callee, args, named_args),
            Expr::Indexing { collection, at } => {
                self.expr(collection)?;
                self.expr(at)?;
                self.function().emit(Opcode::Index, &[]);
                Ok(())
            }
            Expr::Catching(inner) => self.catching(inner),
        }
    }

    /// Compile a bound value; functions take the binding's name.
    fn named_expr(&mut self, name: &str, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Given {
                params,
                named_params,
                result,
            } => self.given(name, params, named_params, result),
            other => self.expr(other),
        }
    }

    fn literal(&mut self, value: &Value) -> Result<(), CompileError> {
        if value.is_data() {
            let k = self.constant(value.clone())?;
            self.function().emit(Opcode::Value, &[k]);
            return Ok(());
        }
        match value {
            Value::Function(f) => {
                let name = f.name().to_string();
                let p = self.platform(&name, value.clone())?;
                self.function().emit(Opcode::Platform, &[p]);
                Ok(())
            }
            other => Err(CompileError::InvalidAst {
                reason: format!("{} values cannot be literals", other.type_of()),
            }),
        }
    }

    fn name(&mut self, name: &str) -> Result<(), CompileError> {
        let diagnostic = Some(Diagnostic {
            name: name.to_string(),
            is_argument: false,
        });
        match self.resolve(name)? {
            Resolved::Local { depth, slot } => {
                self.function().emit_with(Opcode::ReadLocal, &[depth, slot], diagnostic);
            }
            Resolved::Upvalue(index) => {
                self.function().emit_with(Opcode::ReadUpvalue, &[index], diagnostic);
            }
            Resolved::Host(value) => self.host_value(name, value)?,
        }
        Ok(())
    }

    fn array(&mut self, elements: &[ArrayElement]) -> Result<(), CompileError> {
        self.function().emit(Opcode::Array, &[]);
        for element in elements {
            match element {
                ArrayElement::Item(e) => {
                    self.expr(e)?;
                    self.function().emit(Opcode::ArrayPush, &[]);
                }
                ArrayElement::Spread(e) => {
                    self.expr(e)?;
                    self.function().emit(Opcode::ArrayExtend, &[]);
                }
            }
        }
        Ok(())
    }

    fn object(&mut self, entries: &[ObjectElement]) -> Result<(), CompileError> {
        self.function().emit(Opcode::Object, &[]);
        for entry in entries {
            match entry {
                ObjectElement::Entry(key, value) => {
                    self.expr(key)?;
                    self.expr(value)?;
                    self.function().emit(Opcode::ObjectPush, &[]);
                }
                ObjectElement::Spread(e) => {
                    self.expr(e)?;
                    self.function().emit(Opcode::ObjectMerge, &[]);
                }
            }
        }
        Ok(())
    }

    fn calling(
        &mut self,
        callee: &Expr,
        args: &[ArrayElement],
        named_args: &[ObjectElement],
    ) -> Result<(), CompileError> {
        self.expr(callee)?;
        self.array(args)?;
        self.object(named_args)?;
        let diagnostic = match callee {
            Expr::Name { name, .. } => Some(Diagnostic {
                name: name.clone(),
                is_argument: false,
            }),
            _ => None,
        };
        let f = self.function();
        f.emit(Opcode::PushScope, &[3]);
        f.emit_with(Opcode::Call, &[], diagnostic);
        f.emit(Opcode::PopScope, &[]);
        Ok(())
    }

    fn catching(&mut self, inner: &Expr) -> Result<(), CompileError> {
        self.function().emit(Opcode::PushScope, &[0]);
        self.scopes.push(CompiledScope::block());
        let recovery = self.function().emit_jump(Opcode::Catch, &[]);
        self.expr(inner)?;
        self.function().emit(Opcode::Uncatch, &[]);
        self.function().land(recovery);
        self.close_block();
        Ok(())
    }

    // ============================================================
    // Scopes and functions
    // ============================================================

    /// Capture every captured slot, then pop the scope.
    fn close_block(&mut self) {
        if let Some(scope) = self.scopes.pop() {
            let f = self.function();
            for slot in scope.captured_rev() {
                f.emit(Opcode::Capture, &[slot]);
            }
            f.emit(Opcode::PopScope, &[]);
        }
    }

    fn defining(&mut self, definitions: &[(Pattern, Expr)], result: &Expr) -> Result<(), CompileError> {
        self.function().emit(Opcode::PushScope, &[0]);
        self.scopes.push(CompiledScope::block());
        for (pattern, _) in definitions {
            for name in pattern.names() {
                self.scope().declare(name);
            }
        }
        self.reserve();
        for (pattern, value) in definitions {
            match pattern.label() {
                Some(name) if matches!(pattern, Pattern::Name(_)) => self.named_expr(name, value)?,
                _ => self.expr(value)?,
            }
            self.destructure(pattern, None)?;
        }
        self.expr(result)?;
        self.close_block();
        Ok(())
    }

    /// Wrap the user expression in a scope holding the retained library
    /// definitions.
    fn library_block(&mut self, retained: &[(&str, &Expr)], expr: &Expr) -> Result<(), CompileError> {
        self.function().emit(Opcode::PushScope, &[0]);
        self.scopes.push(CompiledScope::library());
        let slots: Vec<u32> = retained
            .iter()
            .map(|(name, _)| self.scope().declare(name))
            .collect();
        self.reserve();

        self.in_library = true;
        for ((name, definition), slot) in retained.iter().zip(slots) {
            trace!(definition = *name, "compiling library definition");
            self.named_expr(name, definition)?;
            self.function().emit(Opcode::WriteLocal, &[0, slot]);
        }
        self.in_library = false;

        self.expr(expr)?;
        self.close_block();
        Ok(())
    }

    fn reserve(&mut self) {
        let count = self.scope().reserved();
        if count > 0 {
            self.function().emit(Opcode::Reserve, &[count]);
        }
    }

    fn given(
        &mut self,
        name: &str,
        params: &[ArrayPatternElement],
        named_params: &[ObjectPatternElement],
        result: &Expr,
    ) -> Result<(), CompileError> {
        let scope = self.scopes.len();
        self.scopes.push(CompiledScope::function());
        self.functions.push(CompiledFunction::new(name, scope));

        let patterns = params
            .iter()
            .map(ArrayPatternElement::pattern)
            .chain(named_params.iter().map(ObjectPatternElement::pattern));
        let names: Vec<String> = patterns.flat_map(|p| p.names()).map(str::to_string).collect();
        for param in &names {
            self.scope().declare(param);
        }
        self.reserve();

        if !params.is_empty() {
            self.function().emit(Opcode::ReadLocal, &[0, 1]);
            self.array_pattern(params, true)?;
        }
        if !named_params.is_empty() {
            self.function().emit(Opcode::ReadLocal, &[0, 2]);
            self.object_pattern(named_params, true)?;
        }
        self.expr(result)?;

        let captured = self.scope().captured_rev();
        let f = self.function();
        for slot in captured {
            f.emit(Opcode::Capture, &[slot]);
        }
        f.emit(Opcode::Return, &[]);
        self.scopes.pop();

        let Some(finished) = self.functions.pop() else {
            return Err(CompileError::InvalidAst {
                reason: "unbalanced function".to_string(),
            });
        };
        trace!(function = %finished.name, words = finished.len(), upvalues = finished.upvalues.len(), "compiled function");
        let upvalues = finished.upvalues.clone();
        self.finished.push(finished);
        let index = self.finished.len();

        let f = self.function();
        f.emit_function(index);
        for upvalue in upvalues {
            match upvalue {
                UpvalueRef::Local { depth, slot } => f.emit(Opcode::Closure, &[depth, slot]),
                UpvalueRef::Upvalue { index } => f.emit(Opcode::ClosureUpvalue, &[index]),
            };
        }
        Ok(())
    }

    // ============================================================
    // Destructuring
    // ============================================================

    /// Pop the value on top of the stack into `pattern`'s names.
    ///
    /// `argument` names the parameter when `pattern` is a whole parameter,
    /// so failures are reported against it.
    fn destructure(&mut self, pattern: &Pattern, argument: Option<&str>) -> Result<(), CompileError> {
        match pattern {
            Pattern::Name(name) => {
                let slot = self.scope().lookup(name).ok_or_else(|| CompileError::InvalidAst {
                    reason: format!("pattern name {name} was not declared"),
                })?;
                self.function().emit(Opcode::WriteLocal, &[0, slot]);
                Ok(())
            }
            Pattern::Checked { pattern, schema } => {
                let k = self.schema(schema)?;
                let diagnostic = argument.map(|name| Diagnostic {
                    name: name.to_string(),
                    is_argument: true,
                });
                self.function().emit_with(Opcode::Validate, &[k], diagnostic);
                self.destructure(pattern, None)
            }
            Pattern::Array(elements) => self.array_pattern(elements, false),
            Pattern::Object(entries) => self.object_pattern(entries, false),
        }
    }

    fn schema(&mut self, schema: &Value) -> Result<u32, CompileError> {
        if !schema.is_data() {
            return Err(CompileError::InvalidAst {
                reason: "pattern schemas must be plain data".to_string(),
            });
        }
        self.constant(schema.clone())
    }

    /// `arguments` marks the positional parameter list of a function.
    fn array_pattern(&mut self, elements: &[ArrayPatternElement], arguments: bool) -> Result<(), CompileError> {
        let (fixed, rest) = split_rest(elements, |e| matches!(e, ArrayPatternElement::Rest(_)))?;
        if !arguments {
            let k = self.constant(Value::from("array"))?;
            self.function().emit(Opcode::Validate, &[k]);
        }
        self.function().emit(Opcode::ArrayCopy, &[]);
        if let Some(rest) = rest {
            self.function().emit(Opcode::ArrayCut, &[fixed.len() as u32]);
            self.destructure(rest.pattern(), None)?;
        }
        self.function().emit(Opcode::ArrayReverse, &[]);

        for (i, element) in fixed.iter().enumerate() {
            let pattern = element.pattern();
            let label = if arguments {
                Some(pattern.label().map_or_else(|| format!("#{}", i + 1), str::to_string))
            } else {
                None
            };
            match element {
                ArrayPatternElement::Optional(_, default) => {
                    let jump = self.function().emit_jump(Opcode::ArrayPopOrDefault, &[]);
                    self.expr(default)?;
                    self.function().land(jump);
                }
                _ => {
                    let diagnostic = label.as_ref().map(|name| Diagnostic {
                        name: name.clone(),
                        is_argument: true,
                    });
                    self.function()
                        .emit_with(Opcode::ArrayPop, &[(i + 1) as u32], diagnostic);
                }
            }
            self.destructure(pattern, label.as_deref())?;
        }
        self.function().emit(Opcode::Discard, &[]);
        Ok(())
    }

    /// `arguments` marks the named parameter list of a function.
    fn object_pattern(&mut self, entries: &[ObjectPatternElement], arguments: bool) -> Result<(), CompileError> {
        let (properties, rest) = split_rest(entries, |e| matches!(e, ObjectPatternElement::Rest(_)))?;
        if !arguments {
            let k = self.constant(Value::from("object"))?;
            self.function().emit(Opcode::Validate, &[k]);
        }
        self.function().emit(Opcode::ObjectCopy, &[]);

        for entry in properties {
            let ObjectPatternElement::Property { key, pattern, default } = entry else {
                continue;
            };
            let k = self.constant(Value::from(key.as_str()))?;
            let label = arguments.then(|| pattern.label().unwrap_or(key).to_string());
            match default {
                Some(default) => {
                    let jump = self.function().emit_jump(Opcode::ObjectPopOrDefault, &[k]);
                    self.expr(default)?;
                    self.function().land(jump);
                }
                None => {
                    let diagnostic = label.as_ref().map(|name| Diagnostic {
                        name: name.clone(),
                        is_argument: true,
                    });
                    self.function().emit_with(Opcode::ObjectPop, &[k], diagnostic);
                }
            }
            self.destructure(pattern, label.as_deref())?;
        }

        match rest {
            Some(rest) => self.destructure(rest.pattern(), None),
            None => {
                self.function().emit(Opcode::Discard, &[]);
                Ok(())
            }
        }
    }
}

/// Split off a trailing rest element; a rest anywhere else is rejected.
fn split_rest<T>(elements: &[T], is_rest: impl Fn(&T) -> bool) -> Result<(&[T], Option<&T>), CompileError> {
    match elements.iter().position(&is_rest) {
        None => Ok((elements, None)),
        Some(at) if at + 1 == elements.len() => Ok((&elements[..at], Some(&elements[at]))),
        Some(_) => Err(CompileError::InvalidAst {
            reason: "a rest pattern must come last".to_string(),
        }),
    }
}

fn table_index(table: &'static str, count: usize) -> Result<u32, CompileError> {
    u32::try_from(count)
        .ok()
        .filter(|&index| index < u32::MAX)
        .ok_or(CompileError::TooManyConstants { table, count })
}
