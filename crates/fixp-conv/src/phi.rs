//! Phi cycle resolution. A phi whose incoming values are themselves being
//! converted would block the forward sweep, so each convertible phi is
//! split into a pair of placeholders up front and patched back together
//! after the sweep.

use fixp_core::fixed_point::FixedPointType;
use fixp_core::ir::{InsertPoint, ValueId};

use crate::fold::FoldPolicy;
use crate::info::{Converted, PhiReplacement};
use crate::pass::FloatToFixed;

impl FloatToFixed<'_> {
    /// Redirect all current uses of `phi` to a fresh non-converted
    /// placeholder, and pre-register a converted placeholder as its
    /// counterpart in the operand pool. A phi with no uses gets nothing.
    pub(crate) fn open_phi_loop(&mut self, phi: ValueId) {
        if self.module.use_empty(phi) {
            tracing::debug!("phi {} not currently used by anything; skipping placeholder creation", phi);
            return;
        }

        let block = self.module.value(phi).as_inst().expect("not a phi").block;
        let ty = self.module.ty_of(phi);
        let placeh_noconv = self.module.create_placeholder(ty, block, "phi_noconv");
        let info = self.vinfo.get(phi).cloned().unwrap_or_default();
        self.vinfo.overwrite(placeh_noconv, info.clone());
        self.module.replace_all_uses_with(phi, placeh_noconv);
        self.module.copy_meta(placeh_noconv, phi);

        let placeh_conv = if self.is_float_to_convert(phi) {
            let conv_ty = self
                .mapped_type_for_value(phi)
                .expect("convertible phi must have a mappable type");
            let p = self.module.create_placeholder(conv_ty, block, "phi_conv");
            self.vinfo.overwrite(p, info);
            self.module.copy_meta(p, phi);
            p
        } else {
            placeh_noconv
        };
        self.operand_pool.set(placeh_noconv, Converted::Value(placeh_conv));

        tracing::debug!(
            "created placeholder (non-converted={}, converted={}) for phi {}",
            placeh_noconv,
            placeh_conv,
            phi
        );
        self.phi_replacements.push(PhiReplacement { phi, placeh_noconv, placeh_conv });
    }

    /// Restore the data flow broken by `open_phi_loop`: non-conversion
    /// contexts get the original phi back, converted contexts get the
    /// phi's replacement (or, as a last resort, a conversion generated on
    /// the spot).
    pub(crate) fn close_phi_loops(&mut self) {
        tracing::debug!("closing phi loops");

        let replacements = std::mem::take(&mut self.phi_replacements);
        for info in &replacements {
            let orig_phi = info.phi;
            tracing::debug!("restoring data flow of phi {}", orig_phi);

            if info.placeh_noconv != info.placeh_conv {
                self.module.replace_all_uses_with(info.placeh_noconv, orig_phi);
            }

            let subst = match self.operand_pool.converted(orig_phi) {
                Some(s) => s,
                None => {
                    tracing::debug!(
                        "phi {} could not be converted; trying last resort conversion",
                        orig_phi
                    );
                    let mut hint: FixedPointType = self.vinfo.fixp_type(orig_phi);
                    self.translate_or_match_operand(
                        orig_phi,
                        &mut hint,
                        Some(InsertPoint::After(orig_phi)),
                        FoldPolicy::ForceHint,
                    )
                    .expect("phi conversion has failed")
                }
            };

            self.module.replace_all_uses_with(info.placeh_conv, subst);
            tracing::debug!("restored data flow of phi {} to {}", orig_phi, subst);

            if info.placeh_noconv != info.placeh_conv && self.module.use_empty(info.placeh_noconv) {
                self.module.erase_placeholder(info.placeh_noconv);
            }
            if self.module.use_empty(info.placeh_conv) && !self.module.is_erased(info.placeh_conv) {
                self.module.erase_placeholder(info.placeh_conv);
            }
        }
        self.phi_replacements = replacements;
    }
}
