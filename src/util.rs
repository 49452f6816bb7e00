use nalgebra::DVector;
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;

/// y = Ax
pub fn spmv(a: &CsrMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let mut y = DVector::zeros(a.nrows());
    spmv_into(&mut y, 0.0, 1.0, a, x);
    y
}

/// y = beta * y + alpha * Ax
pub fn spmv_into(y: &mut DVector<f64>, beta: f64, alpha: f64, a: &CsrMatrix<f64>, x: &DVector<f64>) {
    spmm_csr_dense(beta, y, alpha, Op::NoOp(a), Op::NoOp(x));
}

/// y = beta * y + alpha * A^T x
pub fn spmv_transpose_into(y: &mut DVector<f64>, beta: f64, alpha: f64, a: &CsrMatrix<f64>, x: &DVector<f64>) {
    spmm_csr_dense(beta, y, alpha, Op::Transpose(a), Op::NoOp(x));
}

/// The energy norm $\sqrt{x^T A x}$, assuming `a` is positive semi-definite.
pub fn energy_norm(a: &CsrMatrix<f64>, x: &DVector<f64>) -> f64 {
    x.dot(&spmv(a, x)).max(0.0).sqrt()
}
