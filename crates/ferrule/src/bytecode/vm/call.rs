//! The call protocol: argument binding, instantiation, class creation and generators.

use std::sync::Arc;

use super::{Frame, FrameExit, ResumeValue, VM};
use crate::{
    args::ArgValues,
    builtins,
    bytecode::{
        code::CodeFlags,
        op::{Opcode, split_call_arg},
    },
    exception_private::{ExcType, RunError, RunResult},
    function::{CallContext, Function},
    io::PrintWriter,
    namespace::{Dict, Namespace},
    resource::ResourceTracker,
    tracer::VmTracer,
    types::{BuiltinType, Generator, GeneratorState, GeneratorStep, Instance, TypeId},
    value::Value,
};

impl<T: ResourceTracker, P: PrintWriter, Tr: VmTracer> VM<'_, T, P, Tr> {
    /// Calls any callable value.
    pub(super) fn call_value(&mut self, callable: &Value, mut args: ArgValues) -> RunResult<Value> {
        match callable {
            Value::Function(function) => self.call_function(function, args),
            Value::Native(native) => (native.func)(self, args),
            Value::BoundMethod(method) => {
                args.prepend(method.receiver.clone());
                self.call_value(&method.function, args)
            }
            Value::Type(id) => self.instantiate(*id, args),
            Value::StaticMethod(inner) => self.call_value(inner, args),
            Value::Instance(_) => match self.call_special_args(callable, "__call__", args)? {
                Some(result) => Ok(result),
                None => Err(not_callable(self, callable)),
            },
            other => Err(not_callable(self, other)),
        }
    }

    /// The `CallFunction*` family: collects the callee and its arguments from the stack.
    ///
    /// Layout, bottom to top: callable, positional arguments, keyword name/value pairs, then the
    /// `*args` sequence and the `**kwargs` dict when the opcode carries them.
    pub(super) fn call_from_stack(&mut self, frame: &mut Frame, op: Opcode, arg: u16) -> RunResult<Value> {
        let (positional_count, keyword_count) = split_call_arg(arg);
        let has_kwargs = matches!(op, Opcode::CallFunctionKw | Opcode::CallFunctionVarKw);
        let has_varargs = matches!(op, Opcode::CallFunctionVar | Opcode::CallFunctionVarKw);

        let kwargs = if has_kwargs { Some(frame.stack.pop()?) } else { None };
        let varargs = if has_varargs { Some(frame.stack.pop()?) } else { None };
        let pairs = frame.stack.pop_n(2 * keyword_count)?;
        let positional = frame.stack.pop_n(positional_count)?;
        let callable = frame.stack.pop()?;

        let mut args = ArgValues::positional(positional);
        if let Some(extra) = varargs {
            args.positional.extend(self.collect(&extra)?);
        }
        let mut pairs = pairs.into_iter();
        while let (Some(name), Some(value)) = (pairs.next(), pairs.next()) {
            let Value::Str(name) = name else {
                return Err(RunError::internal("keyword argument name is not a string"));
            };
            args.keywords.push((name, value));
        }
        match kwargs {
            Some(Value::Dict(dict)) => {
                let entries: Vec<_> = dict.lock().iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                args.keywords.extend(entries);
            }
            Some(other) => {
                return Err(ExcType::type_error(format_args!(
                    "argument after ** must be a mapping, not {}",
                    self.runtime.value_type_name(&other)
                )));
            }
            None => {}
        }
        self.call_value(&callable, args)
    }

    fn call_function(&mut self, function: &Arc<Function>, args: ArgValues) -> RunResult<Value> {
        let locals = bind_arguments(function, args)?;
        let mut frame = Frame::for_function(
            function.code().clone(),
            function.globals().clone(),
            locals,
            function.closure(),
        );
        if function.code().is_generator() {
            self.track_allocation()?;
            let generator = Generator::new(Arc::from(function.name()), frame);
            return Ok(Value::Generator(Arc::new(generator)));
        }
        match self.execute_frame(&mut frame)? {
            FrameExit::Return(value) => Ok(value),
            FrameExit::Yield(_) => Err(RunError::internal("yield outside a generator function")),
        }
    }

    /// Calling a class: builtin constructor, exception construction, or a new instance plus
    /// `__init__`.
    fn instantiate(&mut self, id: TypeId, args: ArgValues) -> RunResult<Value> {
        if let Some(builtin) = self.runtime.type_builtin(id)
            && builtin != BuiltinType::Object
        {
            return builtins::construct(self, builtin, args);
        }
        let is_exception = self.runtime.is_exception_type(id);
        let init = self.runtime.lookup_in_type(id, "__init__");
        self.track_allocation()?;
        let instance = if is_exception {
            if init.is_none() {
                args.check_no_kwargs(&self.runtime.type_name(id))?;
            }
            self.runtime.new_exception(id, args.positional.to_vec())
        } else {
            Value::Instance(Arc::new(Instance::new(id)))
        };

        match init {
            Some(init) => {
                let bound = self.bind_descriptor(&instance, id, init)?;
                let result = self.call_value(&bound, args)?;
                if !result.is_none() {
                    return Err(ExcType::type_error(format_args!(
                        "__init__() should return None, not '{}'",
                        self.runtime.value_type_name(&result)
                    )));
                }
            }
            None if !is_exception && (args.count() > 0 || !args.keywords.is_empty()) => {
                return Err(ExcType::type_error(format_args!(
                    "{}() takes no arguments",
                    self.runtime.type_name(id)
                )));
            }
            None => {}
        }
        Ok(instance)
    }

    /// `BuildClass`: runs the class body and creates the type.
    ///
    /// Stack, bottom to top: class name, tuple of bases, body function.
    pub(super) fn build_class(&mut self, frame: &mut Frame) -> RunResult<Value> {
        let body = frame.stack.pop()?;
        let bases = frame.stack.pop()?;
        let name = frame.stack.pop()?;
        let Value::Function(body) = body else {
            return Err(RunError::internal("class body is not a function"));
        };
        let Value::Str(name) = name else {
            return Err(RunError::internal("class name is not a string"));
        };
        let Value::Tuple(bases) = bases else {
            return Err(RunError::internal("class bases are not a tuple"));
        };
        let base_ids = bases
            .iter()
            .map(|base| match base {
                Value::Type(id) => Ok(*id),
                other => Err(ExcType::type_error(format_args!(
                    "bases must be types, not '{}'",
                    self.runtime.value_type_name(other)
                ))),
            })
            .collect::<RunResult<Vec<TypeId>>>()?;

        let namespace = Namespace::new();
        let mut body_frame = Frame::for_class_body(
            body.code().clone(),
            body.globals().clone(),
            namespace.clone(),
            body.closure(),
        );
        match self.execute_frame(&mut body_frame)? {
            FrameExit::Return(_) => {}
            FrameExit::Yield(_) => return Err(RunError::internal("class body yielded")),
        }
        self.track_allocation()?;
        let id = self.runtime.create_type(&name, &base_ids, namespace.snapshot())?;
        Ok(Value::Type(id))
    }

    /// Resumes a generator, managing its running/finished state around the frame execution.
    pub(super) fn resume_gen(&mut self, generator: &Arc<Generator>, value: ResumeValue) -> RunResult<GeneratorStep> {
        if generator.state() == GeneratorState::New
            && let ResumeValue::Send(sent) = &value
            && !sent.is_none()
        {
            return Err(ExcType::type_error(
                "can't send non-None value to a just-started generator",
            ));
        }
        let (state, frame) = generator.start_running();
        let mut frame = match (state, frame) {
            (GeneratorState::Running, _) => return Err(ExcType::value_error("generator already executing")),
            (_, Some(frame)) => frame,
            (_, None) => {
                return match value {
                    ResumeValue::Send(_) => Ok(GeneratorStep::Returned(Value::None)),
                    ResumeValue::Throw(exc) => Err(RunError::raise_object(exc)),
                };
            }
        };
        match self.resume_frame(&mut frame, value) {
            Ok(FrameExit::Yield(value)) => {
                generator.suspend(frame);
                Ok(GeneratorStep::Yielded(value))
            }
            Ok(FrameExit::Return(value)) => {
                generator.finish();
                Ok(GeneratorStep::Returned(value))
            }
            Err(err) => {
                generator.finish();
                if err.is_exc(self.runtime, ExcType::StopIteration) {
                    Err(ExcType::runtime_error("generator raised StopIteration"))
                } else {
                    Err(err)
                }
            }
        }
    }
}

fn not_callable<T: ResourceTracker, P: PrintWriter, Tr: VmTracer>(vm: &VM<'_, T, P, Tr>, value: &Value) -> RunError {
    ExcType::type_error(format_args!(
        "'{}' object is not callable",
        vm.runtime.value_type_name(value)
    ))
}

/// Binds call arguments to the parameter slots of `function`'s code.
///
/// Positional arguments fill the leading parameters, keywords fill parameters by name, defaults
/// cover the trailing ones; surplus positionals go to `*args` and unknown keywords to `**kwargs`
/// when the code accepts them.
fn bind_arguments(function: &Function, args: ArgValues) -> RunResult<Vec<Option<Value>>> {
    let code = function.code();
    let name = code.name();
    let arg_count = code.arg_count();
    let flags = code.flags();
    let accepts_varargs = flags.contains(CodeFlags::VARARGS);
    let accepts_varkw = flags.contains(CodeFlags::VARKEYWORDS);
    let param_count = arg_count + usize::from(accepts_varargs) + usize::from(accepts_varkw);
    let varnames = code.varnames();
    if varnames.len() < param_count {
        return Err(RunError::internal("code declares more parameters than local slots"));
    }

    let defaults = function.defaults();
    let ArgValues { positional, keywords } = args;
    let given = positional.len();
    if given > arg_count && !accepts_varargs {
        return Err(too_many_positional(name, arg_count, defaults.len(), given));
    }

    let mut locals: Vec<Option<Value>> = vec![None; varnames.len()];
    let mut positional = positional.into_iter();
    for slot in locals.iter_mut().take(arg_count.min(given)) {
        *slot = positional.next();
    }
    let surplus: Vec<Value> = positional.collect();

    let mut extra_keywords = Dict::default();
    for (key, value) in keywords {
        match varnames[..arg_count].iter().position(|param| *param == key) {
            Some(slot) if locals[slot].is_some() => {
                return Err(ExcType::type_error(format_args!(
                    "{name}() got multiple values for argument '{key}'"
                )));
            }
            Some(slot) => locals[slot] = Some(value),
            None if accepts_varkw => {
                extra_keywords.insert(key, value);
            }
            None => {
                return Err(ExcType::type_error(format_args!(
                    "{name}() got an unexpected keyword argument '{key}'"
                )));
            }
        }
    }

    let first_default = arg_count.saturating_sub(defaults.len());
    let mut missing = Vec::new();
    for slot in 0..arg_count {
        if locals[slot].is_some() {
            continue;
        }
        if slot >= first_default {
            locals[slot] = Some(defaults[slot - first_default].clone());
        } else {
            missing.push(&*varnames[slot]);
        }
    }
    if !missing.is_empty() {
        return Err(missing_arguments(name, &missing));
    }

    let mut next = arg_count;
    if accepts_varargs {
        locals[next] = Some(Value::tuple(surplus));
        next += 1;
    }
    if accepts_varkw {
        locals[next] = Some(Value::dict(extra_keywords));
    }
    Ok(locals)
}

fn too_many_positional(name: &str, arg_count: usize, default_count: usize, given: usize) -> RunError {
    let takes = if default_count > 0 {
        format!("from {} to {arg_count}", arg_count - default_count.min(arg_count))
    } else {
        arg_count.to_string()
    };
    let plural = if arg_count == 1 && default_count == 0 { "" } else { "s" };
    let verb = if given == 1 { "was" } else { "were" };
    ExcType::type_error(format_args!(
        "{name}() takes {takes} positional argument{plural} but {given} {verb} given"
    ))
}

fn missing_arguments(name: &str, missing: &[&str]) -> RunError {
    let quoted: Vec<String> = missing.iter().map(|param| format!("'{param}'")).collect();
    let list = match quoted.as_slice() {
        [single] => single.clone(),
        [first, second] => format!("{first} and {second}"),
        [init @ .., last] => format!("{}, and {last}", init.join(", ")),
        [] => String::new(),
    };
    let plural = if missing.len() == 1 { "" } else { "s" };
    ExcType::type_error(format_args!(
        "{name}() missing {} required positional argument{plural}: {list}",
        missing.len()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_messages() {
        let msg = |err: RunError| err.to_string();
        assert_eq!(
            msg(too_many_positional("f", 2, 0, 3)),
            "TypeError: f() takes 2 positional arguments but 3 were given"
        );
        assert_eq!(
            msg(too_many_positional("f", 2, 1, 3)),
            "TypeError: f() takes from 1 to 2 positional arguments but 3 were given"
        );
        assert_eq!(
            msg(too_many_positional("g", 0, 0, 1)),
            "TypeError: g() takes 0 positional arguments but 1 was given"
        );
        assert_eq!(
            msg(missing_arguments("f", &["a"])),
            "TypeError: f() missing 1 required positional argument: 'a'"
        );
        assert_eq!(
            msg(missing_arguments("f", &["x", "y", "z"])),
            "TypeError: f() missing 3 required positional arguments: 'x', 'y', and 'z'"
        );
    }
}
