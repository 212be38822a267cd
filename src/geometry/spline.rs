/// 自然境界条件の3次スプライン（1軸分）
///
/// 節点は `t_i = i / (n - 1)` に等間隔配置し、両端の2階微分を0とします。
/// 2点の場合は線形補間と一致します。
#[derive(Debug, Clone)]
pub struct NaturalCubicSpline {
    values: Vec<f64>,
    /// 各節点での2階微分
    second_derivatives: Vec<f64>,
    /// 節点間隔
    h: f64,
}

impl NaturalCubicSpline {
    /// 等間隔節点上の値からスプラインを構築
    ///
    /// # 引数
    ///
    /// * `values` - 節点での値（2点以上）
    pub fn new(values: &[f64]) -> Self {
        let n = values.len();
        debug_assert!(n >= 2);
        let h = 1.0 / (n.saturating_sub(1).max(1)) as f64;
        let second_derivatives = if n <= 2 {
            vec![0.0; n]
        } else {
            Self::solve_second_derivatives(values, h)
        };

        Self {
            values: values.to_vec(),
            second_derivatives,
            h,
        }
    }

    /// 三重対角系をトーマス法で解く
    fn solve_second_derivatives(values: &[f64], h: f64) -> Vec<f64> {
        let n = values.len();
        // 内部節点 1..n-1 の未知数のみを解く（両端は0）
        let m = n - 2;
        let mut diag = vec![4.0 * h; m];
        let mut rhs: Vec<f64> = (1..n - 1)
            .map(|i| 6.0 * ((values[i + 1] - values[i]) - (values[i] - values[i - 1])) / h)
            .collect();
        let off = h;

        for i in 1..m {
            let w = off / diag[i - 1];
            diag[i] -= w * off;
            rhs[i] -= w * rhs[i - 1];
        }

        let mut inner = vec![0.0; m];
        inner[m - 1] = rhs[m - 1] / diag[m - 1];
        for i in (0..m - 1).rev() {
            inner[i] = (rhs[i] - off * inner[i + 1]) / diag[i];
        }

        let mut result = Vec::with_capacity(n);
        result.push(0.0);
        result.extend(inner);
        result.push(0.0);
        result
    }

    /// パラメータ `t ∈ [0, 1]` での値
    pub fn evaluate(&self, t: f64) -> f64 {
        let n = self.values.len();
        let t = t.clamp(0.0, 1.0);
        let k = ((t / self.h) as usize).min(n - 2);
        let x0 = k as f64 * self.h;
        let a = (x0 + self.h - t) / self.h;
        let b = (t - x0) / self.h;

        a * self.values[k]
            + b * self.values[k + 1]
            + ((a.powi(3) - a) * self.second_derivatives[k]
                + (b.powi(3) - b) * self.second_derivatives[k + 1])
                * self.h
                * self.h
                / 6.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spline_passes_through_knots() {
        let values = [0.0, 3.0, 6.0, 8.0];
        let spline = NaturalCubicSpline::new(&values);
        for (i, v) in values.iter().enumerate() {
            let t = i as f64 / 3.0;
            assert!((spline.evaluate(t) - v).abs() < 1e-9, "knot {} mismatch", i);
        }
    }

    #[test]
    fn test_two_points_is_linear() {
        let spline = NaturalCubicSpline::new(&[1.0, 3.0]);
        assert!((spline.evaluate(0.25) - 1.5).abs() < 1e-12);
        assert!((spline.evaluate(0.5) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_linear_data_stays_linear() {
        // 等間隔の線形データでは2階微分は全て0
        let spline = NaturalCubicSpline::new(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        for i in 0..=20 {
            let t = i as f64 / 20.0;
            assert!((spline.evaluate(t) - 4.0 * t).abs() < 1e-9);
        }
    }

    #[test]
    fn test_natural_boundary() {
        let spline = NaturalCubicSpline::new(&[2.0, 1.8, 2.1, 2.0]);
        assert_eq!(spline.second_derivatives[0], 0.0);
        assert_eq!(spline.second_derivatives[3], 0.0);
    }
}
