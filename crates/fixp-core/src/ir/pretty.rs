//! Human-readable module dump, used by debug logging and the CLI `print`
//! command.

use std::fmt::{self, Formatter, Write as _};

use super::constant::Constant;
use super::inst::InstKind;
use super::module::Module;
use super::value::{FuncId, ValueId, ValueKind};

impl Module {
    fn value_ref(&self, v: ValueId) -> String {
        match self.try_value(v) {
            None => format!("{}<erased>", v),
            Some(data) => match &data.kind {
                ValueKind::Constant(c) => format_constant(c),
                _ => match &data.name {
                    Some(name) => format!("%{}", name),
                    None => format!("%{}", v),
                },
            },
        }
    }

    fn format_inst(&self, v: ValueId) -> String {
        let data = self.value(v);
        let inst = data.as_inst().expect("not an instruction");
        let mut line = String::new();
        if !data.ty.is_void() {
            let _ = write!(line, "{} = ", self.value_ref(v));
        }
        let _ = write!(line, "{}", inst.kind.opcode_name());
        match &inst.kind {
            InstKind::Alloca { allocated } => {
                let _ = write!(line, " {}", allocated);
            }
            InstKind::Call { callee, args } | InstKind::Invoke { callee, args, .. } => {
                let _ = write!(line, " @{}(", self.func(*callee).name);
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        let _ = write!(line, ", ");
                    }
                    let _ = write!(line, "{}", self.value_ref(*a));
                }
                let _ = write!(line, ")");
            }
            InstKind::Phi { incoming } => {
                for (i, inc) in incoming.iter().enumerate() {
                    let sep = if i == 0 { ' ' } else { ',' };
                    let _ = write!(line, "{}[{}, {}]", sep, self.value_ref(inc.value), inc.block);
                }
            }
            InstKind::Br(target) => {
                let _ = write!(line, " {}", target);
            }
            InstKind::CondBr { cond, if_true, if_false } => {
                let _ = write!(line, " {}, {}, {}", self.value_ref(*cond), if_true, if_false);
            }
            InstKind::ICmp(pred, a, b) => {
                let _ = write!(
                    line,
                    " {:?} {}, {}",
                    pred,
                    self.value_ref(*a),
                    self.value_ref(*b)
                );
            }
            InstKind::FCmp(pred, a, b) => {
                let _ = write!(
                    line,
                    " {:?} {}, {}",
                    pred,
                    self.value_ref(*a),
                    self.value_ref(*b)
                );
            }
            kind => {
                for (i, op) in kind.operands().iter().enumerate() {
                    if i > 0 {
                        let _ = write!(line, ",");
                    }
                    let _ = write!(line, " {}", self.value_ref(*op));
                }
            }
        }
        if !data.ty.is_void() {
            let _ = write!(line, " : {}", data.ty);
        }
        line
    }

    fn write_function(&self, f: &mut Formatter<'_>, func: FuncId) -> fmt::Result {
        let data = self.func(func);
        let params = data
            .params
            .iter()
            .map(|p| format!("{}: {}", self.value_ref(*p), self.value(*p).ty))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "fn @{}({}) -> {} {{", data.name, params, data.ret_ty)?;
        for &b in &data.blocks {
            let block = self.block(b);
            match &block.name {
                Some(name) => writeln!(f, "  {} ({}):", b, name)?,
                None => writeln!(f, "  {}:", b)?,
            }
            for &i in &block.insts {
                writeln!(f, "    {}", self.format_inst(i))?;
            }
        }
        writeln!(f, "}}")
    }
}

fn format_constant(c: &Constant) -> String {
    match c {
        Constant::Int { value, ty } => format!("{} {}", ty, value),
        Constant::Float { value, ty } => format!("{} {}", ty, value),
        Constant::Array { elems, .. } => {
            let body = elems.iter().map(format_constant).collect::<Vec<_>>().join(", ");
            format!("[{}]", body)
        }
        Constant::Struct { fields, .. } => {
            let body = fields.iter().map(format_constant).collect::<Vec<_>>().join(", ");
            format!("{{{}}}", body)
        }
        Constant::Undef(ty) => format!("{} undef", ty),
        Constant::Null(ty) => format!("{} null", ty),
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {} {{", self.name)?;
        for g in self.globals() {
            let data = self.value(g);
            let init = data
                .as_global()
                .and_then(|gd| gd.init.as_ref())
                .map(|c| format!(" = {}", format_constant(c)))
                .unwrap_or_default();
            writeln!(f, "  @{}: {}{}", data.name.as_deref().unwrap_or(""), data.ty, init)?;
        }
        for func in self.function_ids() {
            self.write_function(f, func)?;
        }
        writeln!(f, "}}")
    }
}
