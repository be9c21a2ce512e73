//! Reference kernels and their registration.

pub mod broadcast;
pub mod elementwise;
pub mod identity;
pub mod matmul;
pub mod zipmap;

use graphrt::error::RegistryError;
use graphrt::schema::ML_DOMAIN;
use graphrt::types::{DataType, ElementType};
use graphrt::{KernelDef, KernelRegistry, OpKernel};

use elementwise::{BinaryKernel, BinaryOp, UnaryKernel, UnaryOp, BINARY_TYPES};
use identity::IdentityKernel;
use matmul::{GemmKernel, MatMulKernel, MATMUL_TYPES};
use zipmap::ZipMapKernel;

fn tensors(types: &[ElementType]) -> Vec<DataType> {
    types.iter().copied().map(DataType::Tensor).collect()
}

const BINARY_OPS: [BinaryOp; 4] = [BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul, BinaryOp::Div];

const UNARY_OPS: [UnaryOp; 6] = [
    UnaryOp::Relu,
    UnaryOp::Sigmoid,
    UnaryOp::Tanh,
    UnaryOp::Exp,
    UnaryOp::Abs,
    UnaryOp::Neg,
];

/// Registers every reference kernel under `provider`.
pub fn register_kernels(registry: &mut KernelRegistry, provider: &str) -> Result<(), RegistryError> {
    let float = tensors(&[ElementType::F32, ElementType::F64]);

    for op in BINARY_OPS {
        registry.register(
            KernelDef::builder(op.op_type())
                .version_range(1, 6)
                .provider(provider)
                .type_constraint("T", tensors(&BINARY_TYPES))
                .build()?,
            move |info| Ok(Box::new(BinaryKernel::legacy(op, info)?) as Box<dyn OpKernel>),
        )?;
        registry.register(
            KernelDef::builder(op.op_type())
                .since_version(7)
                .provider(provider)
                .type_constraint("T", tensors(&BINARY_TYPES))
                .build()?,
            move |_info| Ok(Box::new(BinaryKernel::new(op)) as Box<dyn OpKernel>),
        )?;
    }

    for op in UNARY_OPS {
        let allowed = if op.supports_integers() {
            tensors(&[ElementType::F32, ElementType::F64, ElementType::I32, ElementType::I64])
        } else {
            float.clone()
        };
        registry.register(
            KernelDef::builder(op.op_type())
                .version_range(1, 5)
                .provider(provider)
                .type_constraint("T", allowed.clone())
                .build()?,
            move |_info| Ok(Box::new(UnaryKernel::new(op)) as Box<dyn OpKernel>),
        )?;
        registry.register(
            KernelDef::builder(op.op_type())
                .since_version(6)
                .provider(provider)
                .type_constraint("T", allowed)
                .build()?,
            move |_info| Ok(Box::new(UnaryKernel::new(op)) as Box<dyn OpKernel>),
        )?;
    }

    registry.register(
        KernelDef::builder("Identity").provider(provider).build()?,
        |_info| Ok(Box::new(IdentityKernel) as Box<dyn OpKernel>),
    )?;

    registry.register(
        KernelDef::builder("MatMul")
            .version_range(1, 8)
            .provider(provider)
            .type_constraint("T", float.clone())
            .build()?,
        |_info| Ok(Box::new(MatMulKernel) as Box<dyn OpKernel>),
    )?;
    registry.register(
        KernelDef::builder("MatMul")
            .since_version(9)
            .provider(provider)
            .type_constraint("T", tensors(&MATMUL_TYPES))
            .build()?,
        |_info| Ok(Box::new(MatMulKernel) as Box<dyn OpKernel>),
    )?;

    registry.register(
        KernelDef::builder("Gemm")
            .version_range(7, 8)
            .provider(provider)
            .type_constraint("T", float.clone())
            .build()?,
        |info| Ok(Box::new(GemmKernel::new(info)?) as Box<dyn OpKernel>),
    )?;
    registry.register(
        KernelDef::builder("Gemm")
            .since_version(9)
            .provider(provider)
            .type_constraint("T", float)
            .build()?,
        |info| Ok(Box::new(GemmKernel::new(info)?) as Box<dyn OpKernel>),
    )?;

    registry.register(
        KernelDef::builder("ZipMap")
            .domain(ML_DOMAIN)
            .provider(provider)
            .build()?,
        |info| Ok(Box::new(ZipMapKernel::new(info)?) as Box<dyn OpKernel>),
    )?;
    Ok(())
}
